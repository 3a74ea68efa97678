use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::leaderboard::RankedEntry;
use crate::services::aggregation_service::{TestSummary, TimeWindow};
use crate::services::record_store::AttemptFilter;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttemptQuery {
    pub test_id: Option<String>,
    pub participant_id: Option<String>,
}

impl From<AttemptQuery> for AttemptFilter {
    fn from(q: AttemptQuery) -> Self {
        AttemptFilter {
            test_id: q.test_id.filter(|s| !s.is_empty()),
            participant_id: q.participant_id.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WindowQuery {
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: Uuid,
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub test_id: String,
    pub entries: Vec<RankedEntry>,
    pub summary: TestSummary,
}
