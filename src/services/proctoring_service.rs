use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringRequest {
    pub actor_id: String,
    pub test_id: String,
    pub activity_log: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctoringVerdict {
    pub is_suspicious: bool,
    pub reason: String,
    pub severity: f32,
}

impl ProctoringVerdict {
    /// Used when the analyzer cannot be reached. Never flags the attempt.
    pub fn unavailable(cause: impl std::fmt::Display) -> Self {
        Self {
            is_suspicious: false,
            reason: format!("Proctoring analysis unavailable: {}", cause),
            severity: 0.0,
        }
    }
}

/// Classifies an activity log as suspicious or not.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProctoringAnalyzer: Send + Sync {
    async fn analyze(&self, request: &ProctoringRequest) -> Result<ProctoringVerdict>;
}

/// Runs the analyzer with a time limit and absorbs every failure into the
/// fallback verdict.
pub async fn analyze_or_fallback(
    analyzer: &dyn ProctoringAnalyzer,
    request: &ProctoringRequest,
    limit: Duration,
) -> ProctoringVerdict {
    match tokio::time::timeout(limit, analyzer.analyze(request)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            tracing::warn!(test_id = %request.test_id, actor_id = %request.actor_id, error = %e, "Proctoring analysis failed");
            ProctoringVerdict::unavailable(e)
        }
        Err(_) => {
            tracing::warn!(test_id = %request.test_id, actor_id = %request.actor_id, "Proctoring analysis timed out");
            ProctoringVerdict::unavailable(format!("timed out after {:?}", limit))
        }
    }
}

#[derive(Clone)]
pub struct HttpProctoringAnalyzer {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpProctoringAnalyzer {
    pub fn new(client: Client, api_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ProctoringAnalyzer for HttpProctoringAnalyzer {
    async fn analyze(&self, request: &ProctoringRequest) -> Result<ProctoringVerdict> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Proctoring("no API key configured".to_string()))?;

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: String,
        }
        #[derive(Serialize)]
        struct ResponseFormat<'a> {
            #[serde(rename = "type")]
            r#type: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            temperature: f32,
            response_format: ResponseFormat<'a>,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct RespChoiceMsg {
            content: String,
        }
        #[derive(Deserialize)]
        struct RespChoice {
            message: RespChoiceMsg,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<RespChoice>,
        }

        let system = "You review online exam activity logs for signs of cheating. \
            Output a JSON object with 'is_suspicious' (boolean), 'reason' (string) and 'severity' (0.0-1.0).";
        let user = serde_json::json!({
            "actor_id": request.actor_id,
            "test_id": request.test_id,
            "activity_log": request.activity_log,
        });

        let req = Req {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            messages: vec![
                Msg {
                    role: "system",
                    content: system.to_string(),
                },
                Msg {
                    role: "user",
                    content: serde_json::to_string(&user)?,
                },
            ],
        };

        let body = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<Resp>()
            .await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Proctoring("empty completion".to_string()))?;
        parse_verdict(&content)
    }
}

fn parse_verdict(content: &str) -> Result<ProctoringVerdict> {
    let val: JsonValue = serde_json::from_str(content)?;
    let is_suspicious = val
        .get("is_suspicious")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| Error::Proctoring("verdict missing 'is_suspicious'".to_string()))?;
    let reason = val
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("No reason given.")
        .to_string();
    let severity = val
        .get("severity")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;
    Ok(ProctoringVerdict {
        is_suspicious,
        reason,
        severity,
    })
}
