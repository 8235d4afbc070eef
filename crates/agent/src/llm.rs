use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use procura_core::config::{LlmConfig, LlmProvider};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 1024;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),

    #[error("llm api returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("llm response was malformed: {0}")]
    MalformedResponse(String),

    #[error("llm api key is not configured")]
    MissingApiKey,
}

impl LlmError {
    /// A missing key or a 4xx rejection (other than rate limiting) will fail
    /// the same way on every attempt, so retrying only burns the deadline.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::MalformedResponse(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::MissingApiKey => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Chat-completion client for the providers named in `[llm]` config.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    model: String,
    api_key: Option<SecretString>,
    base_url: Option<String>,
    retry: RetryPolicy,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Request(error.without_url().to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    fn api_key(&self) -> Result<&SecretString, LlmError> {
        self.api_key.as_ref().ok_or(LlmError::MissingApiKey)
    }

    fn endpoint(&self, default_base: &str, path: &str) -> String {
        let base = self.base_url.as_deref().unwrap_or(default_base);
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String, LlmError> {
        match self.provider {
            LlmProvider::OpenAi => self.complete_openai(system, user).await,
            LlmProvider::Anthropic => self.complete_anthropic(system, user).await,
            LlmProvider::Ollama => self.complete_ollama(system, user).await,
        }
    }

    async fn complete_openai(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = self.endpoint(DEFAULT_OPENAI_BASE_URL, "/v1/chat/completions");
        let payload = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key()?.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| LlmError::Request(error.without_url().to_string()))?;
        let value = read_json(response).await?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| LlmError::MalformedResponse("missing choices[0].message.content".into()))
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = self.endpoint(DEFAULT_ANTHROPIC_BASE_URL, "/v1/messages");
        let payload = json!({
            "model": self.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "system": system,
            "messages": [
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(url)
            .header("x-api-key", self.api_key()?.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|error| LlmError::Request(error.without_url().to_string()))?;
        let value = read_json(response).await?;

        value["content"][0]["text"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| LlmError::MalformedResponse("missing content[0].text".into()))
    }

    async fn complete_ollama(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| LlmError::Request("ollama requires llm.base_url".into()))?;
        let url = format!("{}/api/chat", base.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| LlmError::Request(error.without_url().to_string()))?;
        let value = read_json(response).await?;

        value["message"]["content"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| LlmError::MalformedResponse("missing message.content".into()))
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, LlmError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| LlmError::Request(error.without_url().to_string()))?;
    if !status.is_success() {
        return Err(LlmError::Api { status: status.as_u16(), body: truncate(&body, 512) });
    }
    serde_json::from_str(&body).map_err(|error| LlmError::MalformedResponse(error.to_string()))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let mut last_error = LlmError::Request("no completion attempts were made".into());
        for attempt in 0..=self.retry.max_retries {
            match self.complete_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    warn!(
                        event_name = "llm.completion_failed",
                        attempt,
                        error = %error,
                        "llm completion attempt failed"
                    );
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last_error = error;
                }
            }
            if attempt < self.retry.max_retries {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_side_rejections_are_not_retryable() {
        assert!(!LlmError::MissingApiKey.is_retryable());
        assert!(!LlmError::Api { status: 401, body: "bad key".into() }.is_retryable());
        assert!(!LlmError::Api { status: 404, body: "no model".into() }.is_retryable());

        assert!(LlmError::Api { status: 429, body: "slow down".into() }.is_retryable());
        assert!(LlmError::Api { status: 503, body: "overloaded".into() }.is_retryable());
        assert!(LlmError::Request("connection refused".into()).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_api_key_fails_without_backoff() {
        let client = HttpLlmClient::from_config(&LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        })
        .unwrap();

        let started = tokio::time::Instant::now();
        let error = client.complete("system", "user").await.unwrap_err();

        assert_eq!(error, LlmError::MissingApiKey);
        assert_eq!(started.elapsed(), Duration::ZERO, "no retry sleeps");
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo".repeat(200);
        let cut = truncate(&text, 512);
        assert!(cut.len() <= 512);
        assert!(text.starts_with(&cut));
    }
}
