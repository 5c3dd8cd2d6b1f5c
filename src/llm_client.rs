//! Client for the text generation service that writes alternative subject
//! lines. All calls go through the [`Generator`] trait so the admission gate
//! and tests never depend on a concrete HTTP backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Industry;

pub const SYSTEM_PROMPT: &str = "You are an expert email marketing strategist. \
    Provide concise, actionable feedback on email subject lines.";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const FALLBACK_INSIGHT: &str =
    "The subject line could benefit from more specific language and clearer value proposition.";

// Message fragments that mark a failure as permanent.
const NON_RETRYABLE_MARKERS: &[&str] = &["validation", "authentication", "authorization", "invalid input"];

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream returned no content")]
    EmptyReply,
}

impl UpstreamError {
    /// Timeouts, throttling, server errors and transport failures are worth
    /// another attempt. Client errors and anything that reads like a
    /// validation or auth problem are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) | UpstreamError::EmptyReply => true,
            UpstreamError::Api { status, message } => {
                !matches!(status, 400 | 401 | 403 | 404 | 422) && !has_non_retryable_marker(message)
            }
            UpstreamError::Transport(message) => !has_non_retryable_marker(message),
        }
    }
}

fn has_non_retryable_marker(message: &str) -> bool {
    let lower = message.to_lowercase();
    NON_RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
}

/// The upstream collaborator: one prompt in, free-form text out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
}

pub fn build_prompt(subject: &str, industry: Industry) -> String {
    format!(
        r#"Analyze this email subject line for the {industry} ({display}) industry: "{subject}"

Provide:
1. 3 alternative subject lines that are more engaging and effective
2. One key insight about why the original subject line could be improved

Focus on:
- Industry-specific language and benefits
- Creating urgency without being pushy
- Personalization and relevance
- Clear value proposition
- Optimal length (30-50 characters)

Format the response as JSON:
{{
  "suggestions": ["suggestion1", "suggestion2", "suggestion3"],
  "insight": "your insight here"
}}"#,
        industry = industry.as_str(),
        display = industry.display_name(),
    )
}

/// Parsed generation: the only shape we accept from the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generation {
    pub suggestions: Vec<String>,
    pub insight: String,
}

impl Generation {
    /// Deterministic stand-in for a reply that does not match the schema.
    pub fn fallback(subject: &str) -> Self {
        Self {
            suggestions: vec![
                format!("Enhanced: {subject}"),
                format!("New: {subject} - Limited Time"),
                format!("Improved: {subject} - Don't Miss Out"),
            ],
            insight: FALLBACK_INSIGHT.to_string(),
        }
    }

    /// Strict parse of the model's reply. Any shape mismatch is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let generation: Generation = serde_json::from_str(strip_json_fences(text)).ok()?;
        let valid = !generation.suggestions.is_empty()
            && generation.suggestions.iter().all(|s| !s.trim().is_empty())
            && !generation.insight.trim().is_empty();
        valid.then_some(generation)
    }

    pub fn parse_or_fallback(text: &str, subject: &str) -> Self {
        Self::parse(text).unwrap_or_else(|| {
            warn!(reply_len = text.len(), "Generation did not match the expected schema, using fallback");
            Self::fallback(subject)
        })
    }
}

/// Strips ```json ... ``` or ``` ... ``` fences some models wrap around JSON.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
        }
        None => text,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self, reqwest::Error> {
        // per-attempt deadlines are enforced by the load balancer
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(UpstreamError::EmptyReply)?;

        debug!(model = %self.model, reply_len = content.len(), "Generation call succeeded");
        Ok(content)
    }
}
