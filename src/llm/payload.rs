//! Chat-completions wire payload.
//!
//! Pure mapping from a [`GenerationRequest`] to the JSON body the upstream
//! expects. Assumes [`super::validate::validate_request`] already passed.

use serde::Serialize;
use serde_json::Value;

use super::types::{GenerationRequest, ResponseSchema};

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

impl From<&ResponseSchema> for ResponseFormat {
    fn from(schema: &ResponseSchema) -> Self {
        Self {
            format_type: "json_schema",
            json_schema: JsonSchemaFormat { name: schema.name.clone(), strict: true, schema: schema.schema.clone() },
        }
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Build the upstream body, substituting `default_model` when the request
/// names none.
#[must_use]
pub fn build_payload(request: &GenerationRequest, default_model: &str) -> ChatPayload {
    let params = &request.parameters;
    ChatPayload {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string()),
        messages: vec![
            ChatMessage { role: "system", content: request.system_message.clone() },
            ChatMessage { role: "user", content: request.user_message.clone() },
        ],
        temperature: params.temperature,
        max_tokens: params.max_tokens,
        top_p: params.top_p,
        frequency_penalty: params.frequency_penalty,
        presence_penalty: params.presence_penalty,
        response_format: request.response_schema.as_ref().map(ResponseFormat::from),
    }
}

#[cfg(test)]
#[path = "payload_test.rs"]
mod tests;
