use serde::{Deserialize, Serialize};

use crate::models::question::Question;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub id: String,
    pub title: String,
    pub duration_minutes: u32,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub anti_cheat: AntiCheatSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiCheatSettings {
    #[serde(default)]
    pub detect_tab_switch: bool,
    #[serde(default)]
    pub block_clipboard: bool,
}

impl Test {
    pub fn max_points(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}
