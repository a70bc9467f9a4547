//! LLM types: request, result, and upstream response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// REQUEST
// =============================================================================

/// A named JSON schema the completion must conform to.
///
/// `schema` is a JSON-Schema object: `{"type": "object", "properties": {...},
/// "required": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self { name: name.into(), schema }
    }
}

/// Sampling knobs forwarded to the provider. `None` leaves the provider default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParameters {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Identity attached to telemetry rows. Never sent upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIds {
    pub user_id: Option<Uuid>,
    pub note_id: Option<Uuid>,
}

/// One generation call: a system prompt, a user prompt, and optional shaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_message: String,
    pub user_message: String,
    /// `provider/model`; the configured default is used when absent.
    pub model: Option<String>,
    pub response_schema: Option<ResponseSchema>,
    pub parameters: SamplingParameters,
    pub correlation: CorrelationIds,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(system_message: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self { system_message: system_message.into(), user_message: user_message.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: SamplingParameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_correlation(mut self, user_id: Option<Uuid>, note_id: Option<Uuid>) -> Self {
        self.correlation = CorrelationIds { user_id, note_id };
        self
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// The validated completion: raw text, or a schema-checked JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Completion {
    Text(String),
    Structured(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationMetadata {
    pub model_used: String,
    pub tokens_used: Option<u32>,
    /// Wall time across every attempt, including backoff sleeps.
    pub generation_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult<T> {
    pub data: T,
    pub metadata: GenerationMetadata,
}

// =============================================================================
// UPSTREAM RESPONSE
// =============================================================================

/// Response body of `/chat/completions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
