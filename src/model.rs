//! Model client: the trait seam for generate calls and the HTTP
//! implementation talking to an Ollama-style endpoint.
//!
//! A client performs exactly one attempt per call. The retry budget,
//! per-attempt time bound, timeout growth and backoff all belong to the
//! driver in [`crate::pipeline::invoke`], which keeps test fakes down to a
//! few lines.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GradingConfig;
use crate::error::{GradeError, ModelError};

/// A backend that can answer one generate call.
///
/// Implementations must be cheap to share (`Send + Sync`); the orchestrator
/// holds one behind an `Arc` for the lifetime of the `Grader`.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    /// Sends one prompt and returns the raw response text.
    ///
    /// No internal retries and no internal time bound: the caller wraps the
    /// future in its own timeout and drops it on cancellation.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

// ── Wire format ──────────────────────────────────────────────────────────

/// JSON body of a generate request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    /// Always `false`: grading wants one complete payload, not a token
    /// stream.
    pub stream: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

/// JSON body of a generate response. Extra fields (timings, context) are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// HTTP client for an Ollama-style `{base_url}/generate` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl OllamaClient {
    /// Builds a client from the grading configuration.
    pub fn new(config: &GradingConfig) -> Result<Self, GradeError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GradeError::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        })
    }

    /// The full URL generate calls are POSTed to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerateClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        };
        debug!(endpoint = %self.endpoint, model = %self.model, prompt_chars = prompt.len(), "sending generate request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ModelError::Endpoint {
                status: status.as_u16(),
                detail: truncate_detail(&detail),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(format!("reading response body: {e}")))?;
        let payload: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            ModelError::Transport(format!(
                "invalid generate payload: {e} (body starts: {})",
                truncate_detail(&text)
            ))
        })?;
        Ok(payload.response)
    }
}

/// Caps error detail snippets so a long HTML error page does not flood the
/// logs.
fn truncate_detail(s: &str) -> String {
    const MAX: usize = 300;
    let trimmed = s.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_flat_fields() {
        let req = GenerateRequest {
            model: "deepseek-r1:8b",
            prompt: "Grade this.",
            stream: false,
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 1024,
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "deepseek-r1:8b");
        assert_eq!(json["prompt"], "Grade this.");
        assert_eq!(json["stream"], false);
        assert_eq!(json["max_tokens"], 1024);
        assert!(json.get("options").is_none());
    }

    #[test]
    fn response_ignores_extra_fields() {
        let body = r#"{"response": "ok", "done": true, "total_duration": 12345}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "ok");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = GradingConfig {
            base_url: "http://localhost:11434/api/".into(),
            ..GradingConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn detail_truncation() {
        let long = "x".repeat(1000);
        let out = truncate_detail(&long);
        assert!(out.chars().count() <= 301);
        assert!(out.ends_with('…'));
        assert_eq!(truncate_detail("  short  "), "short");
    }
}
