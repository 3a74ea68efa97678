use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::{AnswerValue, Question};
use crate::models::test_attempt::ScoredAnswer;

/// Locally persisted copy of a graded attempt, written before delivery so
/// results stay viewable when the network never comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    pub attempt_id: Uuid,
    pub test_id: String,
    pub questions: Vec<Question>,
    pub raw_answers: HashMap<String, AnswerValue>,
    pub scored_answers: Vec<ScoredAnswer>,
    pub points_awarded: u32,
    pub max_possible_points: u32,
    pub score_percentage: u32,
    pub computed_at: DateTime<Utc>,
}
