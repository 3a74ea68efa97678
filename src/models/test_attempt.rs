use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::activity_log::ActivityLogEntry;
use crate::models::question::AnswerValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub question_id: String,
    pub raw_answer: Option<AnswerValue>,
    pub is_correct: bool,
    pub points_awarded: u32,
}

/// The durable unit of record. Frozen once handed to the transport or the
/// offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_attempt_consistency"))]
pub struct TestAttempt {
    pub id: Uuid,
    #[validate(length(min = 1, message = "test id is required"))]
    pub test_id: String,
    #[validate(length(min = 1, message = "participant id is required"))]
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(length(min = 1, message = "attempt has no scored answers"))]
    pub answers: Vec<ScoredAnswer>,
    pub points_awarded: u32,
    pub max_possible_points: u32,
    #[validate(range(max = 100))]
    pub score_percentage: u32,
    pub is_suspicious: bool,
    pub suspicious_reason: Option<String>,
    #[serde(default)]
    pub tab_switches: u32,
    #[serde(default)]
    pub activity_log: Vec<ActivityLogEntry>,
}

impl TestAttempt {
    /// Elapsed time, or `None` when the timestamps are inverted.
    pub fn duration(&self) -> Option<Duration> {
        let elapsed = self.end_time - self.start_time;
        if elapsed < Duration::zero() {
            None
        } else {
            Some(elapsed)
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.duration().map(|d| d.num_seconds())
    }
}

fn validate_attempt_consistency(attempt: &TestAttempt) -> Result<(), ValidationError> {
    if attempt.end_time < attempt.start_time {
        return Err(ValidationError::new("end_time_before_start_time"));
    }
    if attempt.points_awarded > attempt.max_possible_points {
        return Err(ValidationError::new("points_exceed_maximum"));
    }
    Ok(())
}
