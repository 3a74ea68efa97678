pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use reqwest::Client;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::services::{
    connectivity::ConnectivityMonitor,
    proctoring_service::HttpProctoringAnalyzer,
    record_store::RecordStore,
    session_service::{SessionDeps, SessionSettings},
    storage::FileStore,
    sync_service::OfflineQueue,
    transport::HttpAttemptTransport,
};

/// Shared state of the record-store HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub record_store: Arc<dyn RecordStore>,
    pub report_offset: FixedOffset,
}

impl AppState {
    pub fn new(record_store: Arc<dyn RecordStore>, report_offset: FixedOffset) -> Self {
        Self {
            record_store,
            report_offset,
        }
    }
}

/// Everything a test-taking client needs: collaborators for
/// [`SessionController`](services::session_service::SessionController) plus
/// the background tasks that keep the offline queue moving.
pub struct ClientContext {
    pub deps: SessionDeps,
    pub settings: SessionSettings,
    background: Vec<JoinHandle<()>>,
}

impl ClientContext {
    /// Wires HTTP collaborators from configuration, then starts the
    /// connectivity probe and the reconnect drain.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let settings = SessionSettings::from_config(config);
        let storage = Arc::new(FileStore::open(format!("{}/client", config.data_dir)).await?);
        let transport = Arc::new(HttpAttemptTransport::new(
            http_client.clone(),
            &config.record_store_url,
        ));
        let proctoring = Arc::new(HttpProctoringAnalyzer::new(
            http_client.clone(),
            config.proctoring_api_url.clone(),
            config.proctoring_api_key.clone(),
            config.proctoring_model.clone(),
        ));
        let queue = Arc::new(OfflineQueue::new(
            storage.clone(),
            transport.clone(),
            settings.transmit_timeout,
        ));
        let connectivity = ConnectivityMonitor::new(false);

        let probe = connectivity.spawn_probe(
            http_client,
            format!("{}/health", config.record_store_url.trim_end_matches('/')),
            Duration::from_secs(config.connectivity_probe_secs.max(1)),
        );
        let drainer = queue.clone().spawn_reconnect_drain(connectivity.clone());

        Ok(Self {
            deps: SessionDeps {
                proctoring,
                transport,
                queue,
                storage,
                connectivity,
            },
            settings,
            background: vec![probe, drainer],
        })
    }
}

impl Drop for ClientContext {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}
