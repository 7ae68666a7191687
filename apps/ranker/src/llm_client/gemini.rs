//! Gemini `generateContent` transport for the primary backend list.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, PROBE_MAX_TOKENS, PROBE_PROMPT};
use crate::llm_client::{LlmError, ModelBackend, ModelClient};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
    #[serde(default)]
    status: String,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate, if it has any text.
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// HTTP client for Google's Generative Language API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{GEMINI_API_BASE}/models/{model}:generateContent")
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: Option<&str>,
        max_output_tokens: u32,
    ) -> Result<String, LlmError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig { max_output_tokens },
        };

        let response = self
            .client
            .post(self.url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&text)
                .map(|e| format!("{} ({})", e.error.message, e.error.status))
                .unwrap_or(text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;
        if let Some(reason) = parsed.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
            debug!("Gemini {model} finished with reason {reason}");
        }
        parsed.text().ok_or(LlmError::EmptyContent)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn probe(&self, backend: &ModelBackend) -> Result<String, LlmError> {
        self.generate(&backend.id, PROBE_PROMPT, None, PROBE_MAX_TOKENS)
            .await
    }

    async fn complete(&self, backend: &ModelBackend, prompt: &str) -> Result<String, LlmError> {
        self.generate(&backend.id, prompt, Some(JSON_ONLY_SYSTEM), MAX_OUTPUT_TOKENS)
            .await
    }
}
