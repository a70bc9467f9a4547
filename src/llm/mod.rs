//! LLM — resilient chat-completions client for note generation features.
//!
//! DESIGN
//! ======
//! [`GenerationService::generate`] is the single entry point:
//! validate → build payload → retry(transport) → parse → telemetry → return.
//! Every stage reports failures as a classified [`GenerationError`], and every
//! call produces exactly one telemetry record with its final outcome. The
//! transport sits behind [`ChatTransport`] so tests can script upstream
//! behavior without a network.

pub mod config;
pub mod payload;
pub mod response;
pub mod retry;
pub mod schema;
pub mod transport;
pub mod types;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{ErrorCode, GenerationError};
use crate::telemetry::{GenerationStatus, TelemetryLogger, TelemetryRecord};
use config::{DEFAULT_LLM_REQUEST_TIMEOUT_SECS, DEFAULT_MODEL, LlmConfig};
use retry::RetryPolicy;
pub use transport::{ChatTransport, HttpTransport};
pub use types::{
    ChatCompletion, Completion, CorrelationIds, GenerationMetadata, GenerationRequest, GenerationResult,
    ResponseSchema, SamplingParameters,
};

// =============================================================================
// SERVICE
// =============================================================================

/// Generation client: owns the transport, retry policy, and telemetry logger.
pub struct GenerationService {
    transport: Arc<dyn ChatTransport>,
    telemetry: TelemetryLogger,
    retry: RetryPolicy,
    request_timeout: Duration,
    default_model: String,
}

impl GenerationService {
    /// Build a service from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Auth`] if the API key is missing.
    pub fn from_env(telemetry: TelemetryLogger) -> Result<Self, GenerationError> {
        Self::from_config(&LlmConfig::from_env()?, telemetry)
    }

    /// Build a service backed by [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Auth`] if the API key is empty, or
    /// [`GenerationError::Network`] if the HTTP client fails to build.
    pub fn from_config(config: &LlmConfig, telemetry: TelemetryLogger) -> Result<Self, GenerationError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), telemetry)
            .with_retry_policy(RetryPolicy::from_config(config))
            .with_request_timeout(config.timeouts.request())
            .with_default_model(config.model.clone()))
    }

    /// Build a service over any transport, with default policy and model.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn ChatTransport>, telemetry: TelemetryLogger) -> Self {
        Self {
            transport,
            telemetry,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deadline for each network attempt, not for the whole call.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Run one generation: text without a schema, validated JSON with one.
    ///
    /// # Errors
    ///
    /// Returns the classified [`GenerationError`] of the first failing stage,
    /// after retries for retryable kinds.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult<Completion>, GenerationError> {
        self.run(request, Ok).await
    }

    /// Like [`Self::generate`], flattening structured output to its JSON text.
    ///
    /// # Errors
    ///
    /// See [`Self::generate`].
    pub async fn generate_text(&self, request: &GenerationRequest) -> Result<GenerationResult<String>, GenerationError> {
        self.run(request, |completion| {
            Ok(match completion {
                Completion::Text(text) => text,
                Completion::Structured(value) => value.to_string(),
            })
        })
        .await
    }

    /// Generate and deserialize into `T`.
    ///
    /// With a schema the value is schema-checked first. Without one the raw
    /// text is decoded as JSON directly.
    ///
    /// # Errors
    ///
    /// See [`Self::generate`]; a value that does not deserialize into `T` is
    /// [`GenerationError::Parse`].
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult<T>, GenerationError> {
        self.run(request, |completion| match completion {
            Completion::Structured(value) => {
                serde_json::from_value(value).map_err(|e| GenerationError::Parse(format!("output does not fit target type: {e}")))
            }
            Completion::Text(text) => serde_json::from_str(text.trim())
                .map_err(|e| GenerationError::Parse(format!("output is not the expected JSON: {e}"))),
        })
        .await
    }

    async fn run<T>(
        &self,
        request: &GenerationRequest,
        decode: impl FnOnce(Completion) -> Result<T, GenerationError>,
    ) -> Result<GenerationResult<T>, GenerationError> {
        let started = Instant::now();
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        info!(
            model = %model,
            user_id = ?request.correlation.user_id,
            note_id = ?request.correlation.note_id,
            structured = request.response_schema.is_some(),
            "llm: generation started"
        );

        let outcome = self
            .attempt(request)
            .await
            .and_then(|(completion, raw)| Ok((decode(completion)?, raw)));
        let generation_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok((data, raw)) => {
                let tokens_used = raw.usage.map(|u| u.total_tokens);
                let model_used = if raw.model.is_empty() { model } else { raw.model };
                info!(model = %model_used, tokens_used, generation_time_ms, "llm: generation succeeded");
                self.telemetry.log(TelemetryRecord {
                    user_id: request.correlation.user_id,
                    note_id: request.correlation.note_id,
                    model_name: model_used.clone(),
                    status: GenerationStatus::Success,
                    generation_time_ms,
                    tokens_used,
                    error_message: None,
                });
                Ok(GenerationResult { data, metadata: GenerationMetadata { model_used, tokens_used, generation_time_ms } })
            }
            Err(e) => {
                warn!(model = %model, code = e.error_code(), error = %e, generation_time_ms, "llm: generation failed");
                self.telemetry.log(TelemetryRecord {
                    user_id: request.correlation.user_id,
                    note_id: request.correlation.note_id,
                    model_name: model,
                    status: GenerationStatus::Failure,
                    generation_time_ms,
                    tokens_used: None,
                    error_message: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Validate, send with retries, and parse. No telemetry here.
    async fn attempt(&self, request: &GenerationRequest) -> Result<(Completion, ChatCompletion), GenerationError> {
        validate::validate_request(request)?;
        let payload = payload::build_payload(request, &self.default_model);
        let raw = self
            .retry
            .run(|_| self.transport.send(&payload, self.request_timeout))
            .await?;
        let completion = response::parse_completion(&raw, request.response_schema.as_ref())?;
        Ok((completion, raw))
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
