use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::test_attempt::TestAttempt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Inserted,
    /// An attempt with the same id was already stored; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFilter {
    pub test_id: Option<String>,
    pub participant_id: Option<String>,
}

impl AttemptFilter {
    pub fn for_test(test_id: impl Into<String>) -> Self {
        Self {
            test_id: Some(test_id.into()),
            participant_id: None,
        }
    }

    pub fn for_participant(participant_id: impl Into<String>) -> Self {
        Self {
            test_id: None,
            participant_id: Some(participant_id.into()),
        }
    }

    pub fn matches(&self, attempt: &TestAttempt) -> bool {
        self.test_id.as_deref().map_or(true, |t| attempt.test_id == t)
            && self
                .participant_id
                .as_deref()
                .map_or(true, |p| attempt.participant_id == p)
    }
}

/// Server-side collection of completed attempts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, attempt: TestAttempt) -> Result<AppendOutcome>;
    async fn list(&self, filter: &AttemptFilter) -> Result<Vec<TestAttempt>>;
}

/// Keeps every attempt in one JSON array on disk.
///
/// Reads are lenient: an entry that no longer deserializes is skipped with a
/// warning instead of failing the whole listing.
pub struct JsonFileRecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tracing::info!(path = %path.display(), "Opened attempt record store");
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    async fn read_raw(&self) -> Result<Vec<JsonValue>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_attempts(&self) -> Result<Vec<TestAttempt>> {
        let raw = self.read_raw().await?;
        let mut attempts = Vec::with_capacity(raw.len());
        for (idx, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<TestAttempt>(value) {
                Ok(a) => attempts.push(a),
                Err(e) => {
                    tracing::warn!(index = idx, error = %e, "Skipping malformed attempt record");
                }
            }
        }
        Ok(attempts)
    }

    async fn write_raw(&self, records: &[JsonValue]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn append(&self, attempt: TestAttempt) -> Result<AppendOutcome> {
        let _guard = self.lock.lock().await;
        let mut raw = self.read_raw().await?;
        let id = attempt.id.to_string();
        let exists = raw
            .iter()
            .any(|v| v.get("id").and_then(JsonValue::as_str) == Some(id.as_str()));
        if exists {
            tracing::debug!(attempt_id = %attempt.id, "Attempt already recorded");
            return Ok(AppendOutcome::Duplicate);
        }

        raw.push(serde_json::to_value(&attempt)?);
        self.write_raw(&raw).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            participant_id = %attempt.participant_id,
            total = raw.len(),
            "Attempt recorded"
        );
        Ok(AppendOutcome::Inserted)
    }

    async fn list(&self, filter: &AttemptFilter) -> Result<Vec<TestAttempt>> {
        let _guard = self.lock.lock().await;
        let attempts = self.read_attempts().await?;
        Ok(attempts.into_iter().filter(|a| filter.matches(a)).collect())
    }
}
