use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::models::test_attempt::TestAttempt;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network unavailable: {0}")]
    Network(String),

    #[error("Transmission timed out after {0:?}")]
    Timeout(Duration),

    #[error("Record store unavailable ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Record store rejected attempt ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl TransportError {
    /// Transient failures go to the offline queue; rejections do not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }
}

/// Delivers a frozen attempt to the record store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptTransport: Send + Sync {
    async fn send(&self, attempt: &TestAttempt) -> std::result::Result<(), TransportError>;
}

/// Sends with an upper bound; a timeout counts as a network failure.
pub async fn send_with_timeout(
    transport: &dyn AttemptTransport,
    attempt: &TestAttempt,
    limit: Duration,
) -> std::result::Result<(), TransportError> {
    match tokio::time::timeout(limit, transport.send(attempt)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}

#[derive(Clone)]
pub struct HttpAttemptTransport {
    client: Client,
    endpoint: String,
}

impl HttpAttemptTransport {
    pub fn new(client: Client, record_store_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/attempts", record_store_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl AttemptTransport for HttpAttemptTransport {
    async fn send(&self, attempt: &TestAttempt) -> std::result::Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(attempt)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let message = resp.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(TransportError::Server {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
