use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

pub const PENDING_SUBMISSIONS_KEY: &str = "pending_submissions";
/// Queued attempts the record store refused; kept for inspection, never retried.
pub const REJECTED_SUBMISSIONS_KEY: &str = "rejected_submissions";

pub fn results_key(test_id: &str) -> String {
    format!("results:{}", test_id)
}

/// Local durable key-value capability used by the session and sync agent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>>;
    async fn put(&self, key: &str, value: JsonValue) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, JsonValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, JsonValue>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Internal("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: JsonValue) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// One JSON file per key. Writes go to a temp file first and are renamed
/// into place.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: JsonValue) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn file_store_round_trips_and_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("kv-{}", uuid::Uuid::new_v4()));
        let store = FileStore::open(&dir).await.unwrap();

        assert_eq!(store.get(&results_key("t-1")).await.unwrap(), None);
        store
            .put(&results_key("t-1"), json!({"score_percentage": 80}))
            .await
            .unwrap();

        let reopened = FileStore::open(&dir).await.unwrap();
        let value = reopened.get(&results_key("t-1")).await.unwrap().unwrap();
        assert_eq!(value["score_percentage"], 80);

        reopened.remove(&results_key("t-1")).await.unwrap();
        reopened.remove(&results_key("t-1")).await.unwrap();
        assert_eq!(reopened.get(&results_key("t-1")).await.unwrap(), None);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
