//! Completion client abstraction.
//!
//! One call, prompt in, completion text out. The HTTP client speaks either
//! the Ollama `/api/generate` format or an OpenAI-compatible
//! `/v1/chat/completions` endpoint. `FakeCompletionClient` replays scripted
//! responses for tests.

use crate::config::{ApiStyle, LlmConfig};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion service is disabled in configuration")]
    Disabled,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Completion service returned an empty response")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Timeouts, network failures and 429/500/502/503/504.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Timeout(_) | CompletionError::Network(_) => true,
            CompletionError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Raw completion text for `prompt`. May be fenced or prose-wrapped JSON.
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError>;
}

pub struct HttpCompletionClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(config: LlmConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn use_ollama(&self) -> bool {
        match self.config.api {
            ApiStyle::Ollama => true,
            ApiStyle::OpenAi => false,
            ApiStyle::Auto => self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn send_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.config.timeout_secs * 1000)
        } else {
            CompletionError::Network(format!("Request failed: {}", e))
        }
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<serde_json::Value, CompletionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                message: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    async fn call_ollama(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let json = self.read_json(response).await?;
        non_empty(json.get("response").and_then(|v| v.as_str()))
    }

    async fn call_openai_compatible(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": "You are a car diagnostics assistant. Respond with JSON only."},
                {"role": "user", "content": prompt},
            ],
            "response_format": {"type": "json_object"},
        });
        let mut request = self.client.post(self.url("/v1/chat/completions")).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|e| self.send_error(e))?;
        let json = self.read_json(response).await?;
        non_empty(
            json.get("choices")
                .and_then(|v| v.get(0))
                .and_then(|v| v.get("message"))
                .and_then(|v| v.get("content"))
                .and_then(|v| v.as_str()),
        )
    }
}

fn non_empty(text: Option<&str>) -> Result<String, CompletionError> {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(CompletionError::EmptyResponse),
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
        if !self.config.enabled {
            return Err(CompletionError::Disabled);
        }
        debug!(model = %self.config.model, ollama = self.use_ollama(), chars = prompt.len(), "Completion request");
        if self.use_ollama() {
            self.call_ollama(prompt).await
        } else {
            self.call_openai_compatible(prompt).await
        }
    }
}

/// Scripted client for tests: responses are served in order and the last
/// one repeats.
pub struct FakeCompletionClient {
    responses: Mutex<Vec<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeCompletionClient {
    pub fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn always_error(error: CompletionError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
        lock(&self.prompts).push(prompt.to_string());
        let mut responses = lock(&self.responses);
        match responses.len() {
            0 => Err(CompletionError::EmptyResponse),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            let err = CompletionError::Http { status, message: String::new() };
            assert!(err.is_retryable(), "{}", status);
        }
        for status in [400, 401, 404, 501] {
            let err = CompletionError::Http { status, message: String::new() };
            assert!(!err.is_retryable(), "{}", status);
        }
        assert!(CompletionError::Timeout(12_000).is_retryable());
        assert!(CompletionError::Network("reset".into()).is_retryable());
        assert!(!CompletionError::Disabled.is_retryable());
        assert!(!CompletionError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_api_style_guess() {
        let client = HttpCompletionClient::new(LlmConfig::default()).unwrap();
        assert!(client.use_ollama());

        let config = LlmConfig {
            endpoint: "https://api.example.com/".into(),
            ..LlmConfig::default()
        };
        let client = HttpCompletionClient::new(config).unwrap();
        assert!(!client.use_ollama());
        assert_eq!(client.url("/v1/chat/completions"), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_fake_sequence_then_repeat() {
        let client = FakeCompletionClient::new(vec![
            Ok("one".into()),
            Err(CompletionError::Timeout(10)),
            Ok("last".into()),
        ]);
        assert_eq!(client.generate("a").await.unwrap(), "one");
        assert_eq!(client.generate("b").await, Err(CompletionError::Timeout(10)));
        assert_eq!(client.generate("c").await.unwrap(), "last");
        assert_eq!(client.generate("d").await.unwrap(), "last");
        assert_eq!(client.call_count(), 4);
        assert_eq!(client.prompts()[1], "b");
    }

    #[tokio::test]
    async fn test_fake_empty_queue() {
        let client = FakeCompletionClient::new(Vec::new());
        assert_eq!(client.generate("x").await, Err(CompletionError::EmptyResponse));
    }
}
