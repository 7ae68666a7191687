/// LLM Client: the single point of entry for all model calls in the ranker.
///
/// ARCHITECTURAL RULE: No other module may call a model provider directly.
/// Ranking goes through `gateway::ModelGateway`, which picks a Gemini model
/// from the configured list and falls back to Anthropic as a last resort.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod gateway;
pub mod gemini;
pub mod prompts;

use prompts::JSON_ONLY_SYSTEM;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used when the secondary provider is enabled.
/// This is intentionally hardcoded to prevent accidental drift.
pub const ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    /// True when the backend itself cannot serve right now (gone, overloaded,
    /// unreachable, silent), as opposed to rejecting this particular request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            LlmError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            LlmError::Api { status, .. } => matches!(status, 404 | 429) || *status >= 500,
            LlmError::EmptyContent | LlmError::Timeout(_) => true,
            LlmError::Parse(_) => false,
        }
    }
}

/// A candidate model on the primary provider. Lower priority is tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelBackend {
    pub id: String,
    pub priority: usize,
}

/// Capability contract for the primary, multi-model provider.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Minimal test completion used for liveness probing.
    async fn probe(&self, backend: &ModelBackend) -> Result<String, LlmError>;

    async fn complete(&self, backend: &ModelBackend, prompt: &str) -> Result<String, LlmError>;
}

/// Last-resort provider, invoked without retries once the primary path has failed.
#[async_trait]
pub trait FallbackProvider: Send + Sync {
    /// Model identifier reported on results this provider produced.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Anthropic Messages API client, used as the secondary provider.
/// One request per call: the secondary path is the last resort and never retries.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            endpoint: ANTHROPIC_API_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Makes a single call to the Claude API, returning the full response object.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: ANTHROPIC_MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Anthropic API returned {}: {}", status, body);
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = response.json().await?;

        debug!(
            "Anthropic call succeeded: input_tokens={}, output_tokens={}",
            llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }
}

#[async_trait]
impl FallbackProvider for AnthropicClient {
    fn name(&self) -> &str {
        ANTHROPIC_MODEL
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, JSON_ONLY_SYSTEM).await?;
        response
            .text()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{http::StatusCode, routing::post, Router};
    use tokio::net::TcpListener;

    use super::*;

    fn api(status: u16) -> LlmError {
        LlmError::Api {
            status,
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_missing_and_overloaded_backends_are_unavailable() {
        for status in [404, 429, 500, 502, 503, 504] {
            assert!(api(status).is_unavailable(), "status {status}");
        }
        assert!(LlmError::EmptyContent.is_unavailable());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_unavailable());
    }

    #[test]
    fn test_request_errors_are_not_unavailable() {
        for status in [400, 401, 403, 422] {
            assert!(!api(status).is_unavailable(), "status {status}");
        }
    }

    #[test]
    fn test_response_text_uses_first_text_block() {
        let json = r#"{
            "content": [
                {"type": "tool_use", "text": null},
                {"type": "text", "text": "{\"top_candidates\": []}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let response: LlmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("{\"top_candidates\": []}"));
    }

    /// Serves `status` on every request and counts how many arrive.
    async fn serve_status(status: StatusCode) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v1/messages",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (status, r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1/messages"), hits)
    }

    #[tokio::test]
    async fn test_secondary_sends_exactly_one_request_on_overload() {
        let (endpoint, hits) = serve_status(StatusCode::SERVICE_UNAVAILABLE).await;
        let client = AnthropicClient::new("k".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_endpoint(endpoint);

        let err = client.complete("rank these").await.unwrap_err();

        assert!(matches!(err, LlmError::Api { status: 503, ref message } if message == "Overloaded"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_secondary_does_not_retry_rate_limits() {
        let (endpoint, hits) = serve_status(StatusCode::TOO_MANY_REQUESTS).await;
        let client = AnthropicClient::new("k".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_endpoint(endpoint);

        let err = client.complete("rank these").await.unwrap_err();

        assert!(matches!(err, LlmError::Api { status: 429, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_anthropic_error_body_parses() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#;
        let parsed: AnthropicError = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "bad");
    }
}
