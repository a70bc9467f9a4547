//! HTTP transport for the chat-completions endpoint.
//!
//! DESIGN
//! ======
//! One call to [`ChatTransport::send`] is exactly one outbound request. The
//! send and the body read share a single `tokio::time::timeout`; when it
//! fires the request future is dropped, which aborts the connection. Every
//! failure leaves this module already classified as a [`GenerationError`].
//! Retrying is the caller's job (see `retry.rs`).

use std::time::Duration;

use serde_json::Value;

use super::config::LlmConfig;
use super::payload::ChatPayload;
use super::response::preview;
use super::types::ChatCompletion;
use crate::error::GenerationError;

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Single-attempt transport. Enables mocking in tests.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one chat-completions request.
    ///
    /// # Errors
    ///
    /// Returns a classified [`GenerationError`] for timeouts, connection
    /// failures, non-2xx statuses, and undecodable bodies.
    async fn send(&self, payload: &ChatPayload, timeout: Duration) -> Result<ChatCompletion, GenerationError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    app_referer: Option<String>,
    app_title: Option<String>,
}

impl HttpTransport {
    /// Build a transport from typed config.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Auth`] when the API key is empty, or
    /// [`GenerationError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Auth("missing API key".into()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect())
            .build()
            .map_err(|e| GenerationError::Network(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_referer: config.app_referer.clone(),
            app_title: config.app_title.clone(),
        })
    }

    async fn post_once(&self, payload: &ChatPayload) -> Result<(u16, String), GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(url).bearer_auth(&self.api_key).json(payload);
        if let Some(referer) = &self.app_referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.app_title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await.map_err(classify_request_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_request_error)?;
        Ok((status, text))
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, payload: &ChatPayload, timeout: Duration) -> Result<ChatCompletion, GenerationError> {
        let (status, text) = tokio::time::timeout(timeout, self.post_once(payload))
            .await
            .map_err(|_| GenerationError::Timeout(format!("no response from upstream within {timeout:?}")))??;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text));
        }
        parse_completion_body(&text)
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

fn classify_request_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(e.to_string())
    } else {
        GenerationError::Network(e.to_string())
    }
}

/// Map a non-success status onto the taxonomy.
pub(crate) fn classify_status(status: u16, body: &str) -> GenerationError {
    let detail = upstream_error_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            "empty response body".to_string()
        } else {
            preview(body, ERROR_BODY_PREVIEW_CHARS)
        }
    });
    let message = format!("status {status}: {detail}");
    match status {
        401 | 403 => GenerationError::Auth(message),
        429 => GenerationError::RateLimit(message),
        400 => GenerationError::Validation(message),
        500..=599 => GenerationError::Service(message),
        _ => GenerationError::Api { status, message },
    }
}

/// Pull `error.message` out of an OpenAI-style error body.
fn upstream_error_message(body: &str) -> Option<String> {
    let root: Value = serde_json::from_str(body).ok()?;
    root.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

pub(crate) fn parse_completion_body(text: &str) -> Result<ChatCompletion, GenerationError> {
    serde_json::from_str(text).map_err(|e| {
        GenerationError::Parse(format!(
            "undecodable completion body ({e}): {}",
            preview(text, ERROR_BODY_PREVIEW_CHARS)
        ))
    })
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
