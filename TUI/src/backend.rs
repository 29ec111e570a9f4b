// Backend communication with the chat service over HTTP

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Config;

pub const NETWORK_ERROR_MESSAGE: &str = "Sorry, I couldn't connect to the server. Please try again.";
pub const INVALID_RESPONSE_MESSAGE: &str = "Received an empty or invalid response from the server.";

/// Result of one chat request, already classified for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Success(String),
    ProtocolError(String),
    NetworkError(String),
}

impl RequestOutcome {
    pub fn network_failure() -> Self {
        RequestOutcome::NetworkError(NETWORK_ERROR_MESSAGE.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestOutcome::Success(_) => "success",
            RequestOutcome::ProtocolError(_) => "protocol_error",
            RequestOutcome::NetworkError(_) => "network_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Per-component fields such as `chromadb_status`
    #[serde(flatten)]
    pub components: BTreeMap<String, Value>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }

    pub fn failing_components(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, value)| {
                value
                    .as_str()
                    .map(|s| s.eq_ignore_ascii_case("error"))
                    .unwrap_or(false)
            })
            .map(|(name, _)| name.trim_end_matches("_status"))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendStatus {
    #[default]
    Unknown,
    Online,
    Degraded,
    Offline,
}

impl BackendStatus {
    pub fn from_probe(result: &Result<HealthReport, BackendError>) -> Self {
        match result {
            Ok(report) if report.is_ok() => BackendStatus::Online,
            Ok(_) => BackendStatus::Degraded,
            Err(_) => BackendStatus::Offline,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BackendStatus::Unknown => "connecting",
            BackendStatus::Online => "online",
            BackendStatus::Degraded => "degraded",
            BackendStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The single seam between the widget and the chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one query. Never fails: every failure is folded into the outcome.
    async fn send(&self, query: &str) -> RequestOutcome;

    async fn health(&self) -> Result<HealthReport, BackendError>;
}

pub struct HttpBackend {
    chat_url: String,
    health_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            chat_url: config.chat_url(),
            health_url: config.health_url(),
            timeout: config.request_timeout(),
            http,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpBackend {
    async fn send(&self, query: &str) -> RequestOutcome {
        let request = self
            .http
            .post(self.chat_url.as_str())
            .timeout(self.timeout)
            .json(&ChatRequest { query });

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    url = %self.chat_url,
                    timeout = err.is_timeout(),
                    connect = err.is_connect(),
                    error = %err,
                    "chat request did not complete"
                );
                return RequestOutcome::network_failure();
            }
        };

        let status = response.status();
        // The request timeout also covers the body, and a stalled or cut-off body never completed
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                error!(
                    url = %self.chat_url,
                    %status,
                    timeout = err.is_timeout(),
                    error = %err,
                    "chat response body did not complete"
                );
                return RequestOutcome::network_failure();
            }
        };

        let outcome = classify_response(status, &body);
        match &outcome {
            RequestOutcome::Success(reply) => {
                debug!(%status, reply_len = reply.len(), "chat reply received")
            }
            other => warn!(%status, outcome = ?other, "chat request rejected"),
        }
        outcome
    }

    async fn health(&self) -> Result<HealthReport, BackendError> {
        let response = self
            .http
            .get(self.health_url.as_str())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        // An unhealthy backend answers 503 with the same report shape
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            return Err(BackendError::Http {
                status,
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map a received HTTP response onto the outcome shown to the user.
pub fn classify_response(status: StatusCode, body: &[u8]) -> RequestOutcome {
    let parsed = serde_json::from_slice::<Value>(body).ok();

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(|value| value.get("error"))
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP error! Status: {}", status.as_u16()));
        return RequestOutcome::ProtocolError(message);
    }

    match parsed
        .as_ref()
        .and_then(|value| value.get("reply"))
        .and_then(Value::as_str)
    {
        Some(reply) if !reply.is_empty() => RequestOutcome::Success(reply.to_string()),
        _ => RequestOutcome::ProtocolError(INVALID_RESPONSE_MESSAGE.to_string()),
    }
}
