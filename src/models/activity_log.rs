use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    SessionStarted,
    AnswerRecorded,
    TabHidden,
    ClipboardBlocked,
    TimeWarning,
    TimeExpired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub source_ip: String,
    pub kind: ActivityKind,
    pub description: String,
}

impl ActivityLogEntry {
    /// One line of proctoring evidence.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] {} ({}): {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.actor,
            self.source_ip,
            self.description
        )
    }
}
