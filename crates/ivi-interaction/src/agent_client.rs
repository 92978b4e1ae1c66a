//! VehicleAgentClient - HTTP client for the vehicle assistant backend.
//!
//! A turn is a `POST {base_url}/api/chat` whose response body is an event
//! stream (see [`crate::sse`]). `GET {base_url}/api/health` reports backend
//! readiness.

use crate::sse::decode_event_stream;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use ivi_core::chat::{ChatRequest, StreamEvent};
use ivi_core::config::AgentConfig;
use ivi_core::{IviError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_PATH: &str = "/api/chat";
const HEALTH_PATH: &str = "/api/health";

/// Typed events of one assistant turn.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Opens the event stream for a turn.
#[async_trait]
pub trait TurnStreamer: Send + Sync {
    async fn open_turn(&self, request: &ChatRequest) -> Result<EventStream>;
}

/// Backend readiness as reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: String,
    #[serde(default)]
    pub mcp_connected: bool,
    #[serde(default)]
    pub gemini_configured: bool,
}

impl AgentHealth {
    pub fn is_ready(&self) -> bool {
        self.status == "ok" && self.mcp_connected && self.gemini_configured
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// HTTP client for the vehicle agent.
#[derive(Clone)]
pub struct VehicleAgentClient {
    client: Client,
    base_url: String,
}

impl VehicleAgentClient {
    /// Creates a client for the agent at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: normalize_base_url(base_url.into()),
        }
    }

    /// Builds a client from configuration, applying the connect timeout.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let client = Self::build_http_client(config.connect_timeout())?;
        Ok(Self::new(config.base_url.clone()).with_http_client(client))
    }

    fn build_http_client(connect_timeout: Duration) -> Result<Client> {
        Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|err| IviError::config(format!("Failed to build HTTP client: {err}")))
    }

    /// Replaces the underlying reqwest client.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Queries backend readiness.
    pub async fn health(&self) -> Result<AgentHealth> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .send()
            .await
            .map_err(|err| IviError::transport(format!("Agent health request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        response
            .json()
            .await
            .map_err(|err| IviError::stream(None, format!("Failed to parse health response: {err}")))
    }
}

#[async_trait]
impl TurnStreamer for VehicleAgentClient {
    async fn open_turn(&self, request: &ChatRequest) -> Result<EventStream> {
        tracing::debug!(
            history = request.history.len(),
            "opening agent turn"
        );
        let response = self
            .client
            .post(self.url(CHAT_PATH))
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|err| IviError::stream(None, format!("Agent request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read agent error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|err| IviError::stream(None, format!("Agent stream read failed: {err}")))
        });
        Ok(decode_event_stream(body))
    }
}

fn normalize_base_url(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Maps a non-success response to a stream error, preferring the body's
/// `error` (or FastAPI `detail`) message over the raw text.
fn map_http_error(status: StatusCode, body_text: &str) -> IviError {
    let message = serde_json::from_str::<ErrorResponse>(body_text)
        .ok()
        .and_then(|body| {
            body.error.or_else(|| {
                body.detail.map(|detail| match detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
            })
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body_text.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });
    IviError::stream(Some(status.as_u16()), message)
}
