use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::test_attempt::TestAttempt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub local_id: String,
    pub attempt: TestAttempt,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSubmission {
    pub submission: PendingSubmission,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}
