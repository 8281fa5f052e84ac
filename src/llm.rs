//! Hosted LLM clients.
//!
//! [`ChatModel`] is the single seam the conversation engine talks to.
//! Two hosted APIs are supported:
//!
//! | `llm.provider` | Endpoint |
//! |----------------|----------|
//! | `"gemini"` | `POST {base}/v1beta/models/{model}:generateContent` |
//! | `"openai"` | `POST {base}/v1/chat/completions` |
//!
//! Transient failures (429, 5xx, network) are retried with backoff; every
//! other failure is classified into [`LlmError`] so callers can show a
//! useful message.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::http::{send_json_with_retry, HttpError, RetryPolicy};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("the API key was rejected: {0}")]
    Auth(String),
    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not reach the LLM API: {0}")]
    Network(String),
    #[error("unexpected LLM response: {0}")]
    InvalidResponse(String),
}

impl From<HttpError> for LlmError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status { status, body } => match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(body),
                // Gemini reports a bad key as 400 INVALID_ARGUMENT.
                StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => LlmError::Auth(body),
                StatusCode::TOO_MANY_REQUESTS => LlmError::Quota(body),
                _ => LlmError::Api {
                    status: status.as_u16(),
                    body,
                },
            },
            HttpError::Network(e) => LlmError::Network(e.to_string()),
            HttpError::Decode(e) => LlmError::InvalidResponse(e),
        }
    }
}

/// A text-generation model behind a hosted API.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a completion for a single-turn prompt.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

struct HttpSettings {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpSettings {
    fn new(config: &LlmConfig, api_key: &str, default_base: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: api_key.to_string(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

// ============ Gemini ============

/// Google Gemini `generateContent` client.
pub struct GeminiChatModel {
    http: HttpSettings,
}

impl GeminiChatModel {
    pub fn new(config: &LlmConfig, api_key: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpSettings::new(config, api_key, GEMINI_BASE_URL)?,
        })
    }

    /// Override the retry policy (mainly to shorten backoff in tests).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.http.retry = retry;
        self
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let http = &self.http;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            http.base_url, http.model
        );
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": http.temperature},
        });

        let started = Instant::now();
        let json = send_json_with_retry(
            || {
                http.client
                    .post(&url)
                    .header("x-goog-api-key", &http.api_key)
                    .json(&body)
            },
            http.retry,
        )
        .await?;
        info!(model = %http.model, elapsed_ms = started.elapsed().as_millis() as u64, "gemini call finished");

        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String, LlmError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let Some(candidate) = candidate else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates returned");
        return Err(LlmError::InvalidResponse(format!("prompt blocked: {}", reason)));
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let finish = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            LlmError::InvalidResponse(format!("candidate has no content (finishReason {})", finish))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    debug!(chars = text.len(), "gemini answer parsed");
    Ok(text)
}

// ============ OpenAI-compatible ============

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct OpenAiChatModel {
    http: HttpSettings,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, api_key: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpSettings::new(config, api_key, OPENAI_BASE_URL)?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.http.retry = retry;
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let http = &self.http;
        let url = format!("{}/v1/chat/completions", http.base_url);
        let body = serde_json::json!({
            "model": http.model,
            "temperature": http.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let started = Instant::now();
        let json = send_json_with_retry(
            || {
                http.client
                    .post(&url)
                    .bearer_auth(&http.api_key)
                    .json(&body)
            },
            http.retry,
        )
        .await?;
        info!(model = %http.model, elapsed_ms = started.elapsed().as_millis() as u64, "openai call finished");

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))
    }
}

/// Create the [`ChatModel`] named by `llm.provider`.
pub fn create_chat_model(config: &LlmConfig, api_key: &str) -> anyhow::Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChatModel::new(config, api_key)?)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config, api_key)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
