//! JSON-over-HTTP with retry and exponential backoff.
//!
//! Shared by the Ollama embedder and the hosted LLM clients:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: base, 2×base, 4×base ... capped at 32×base

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid JSON response: {0}")]
    Decode(String),
}

/// Send the request built by `build` until it succeeds, fails permanently or
/// the retry budget is spent. Returns the decoded JSON body.
pub async fn send_json_with_retry<F>(
    build: F,
    policy: RetryPolicy,
) -> Result<serde_json::Value, HttpError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            debug!(attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| HttpError::Decode(e.to_string()));
                }

                let body = response.text().await.unwrap_or_default();
                let err = HttpError::Status { status, body };
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(HttpError::Network(e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| HttpError::Decode("request failed after retries".to_string())))
}
