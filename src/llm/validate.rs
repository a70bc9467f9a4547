//! Request validation. Runs before any payload is built or sent.
//!
//! Rules are checked in a fixed order and the first violation wins, so the
//! error a caller sees is deterministic for a given request.

use serde_json::Value;

use super::types::{GenerationRequest, ResponseSchema, SamplingParameters};
use crate::error::GenerationError;

pub const MAX_MESSAGE_CHARS: usize = 50_000;

const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);
const TOP_P_RANGE: (f64, f64) = (0.0, 1.0);
const PENALTY_RANGE: (f64, f64) = (-2.0, 2.0);

/// Check `request` against the input contract.
///
/// # Errors
///
/// Returns [`GenerationError::Validation`] describing the first violated rule.
pub fn validate_request(request: &GenerationRequest) -> Result<(), GenerationError> {
    check_non_blank("system message", &request.system_message)?;
    check_non_blank("user message", &request.user_message)?;
    check_length("system message", &request.system_message)?;
    check_length("user message", &request.user_message)?;

    if let Some(model) = &request.model {
        check_model_name(model)?;
    }
    if let Some(schema) = &request.response_schema {
        check_schema(schema)?;
    }
    check_parameters(&request.parameters)
}

fn check_non_blank(label: &str, text: &str) -> Result<(), GenerationError> {
    if text.trim().is_empty() {
        return Err(GenerationError::Validation(format!("{label} must not be empty")));
    }
    Ok(())
}

fn check_length(label: &str, text: &str) -> Result<(), GenerationError> {
    let chars = text.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(GenerationError::Validation(format!(
            "{label} is {chars} characters (max {MAX_MESSAGE_CHARS})"
        )));
    }
    Ok(())
}

/// `provider/model`: exactly one slash, both halves non-empty.
fn check_model_name(model: &str) -> Result<(), GenerationError> {
    let valid = model
        .split_once('/')
        .is_some_and(|(provider, name)| is_model_segment(provider) && is_model_segment(name));
    if !valid {
        return Err(GenerationError::Validation(format!(
            "invalid model name '{model}' (expected 'provider/model')"
        )));
    }
    Ok(())
}

fn is_model_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | ':'))
}

fn check_schema(schema: &ResponseSchema) -> Result<(), GenerationError> {
    if schema.name.trim().is_empty() {
        return Err(GenerationError::Validation("response schema must have a name".into()));
    }
    if schema.schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(GenerationError::Validation(format!(
            "response schema '{}' must have type \"object\"",
            schema.name
        )));
    }
    let has_properties = schema
        .schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());
    if !has_properties {
        return Err(GenerationError::Validation(format!(
            "response schema '{}' must declare at least one property",
            schema.name
        )));
    }
    Ok(())
}

fn check_parameters(params: &SamplingParameters) -> Result<(), GenerationError> {
    check_range("temperature", params.temperature, TEMPERATURE_RANGE)?;
    check_range("top_p", params.top_p, TOP_P_RANGE)?;
    check_range("frequency_penalty", params.frequency_penalty, PENALTY_RANGE)?;
    check_range("presence_penalty", params.presence_penalty, PENALTY_RANGE)?;
    if params.max_tokens == Some(0) {
        return Err(GenerationError::Validation("max_tokens must be at least 1".into()));
    }
    Ok(())
}

fn check_range(name: &str, value: Option<f64>, (min, max): (f64, f64)) -> Result<(), GenerationError> {
    match value {
        // NaN fails the range check too.
        Some(v) if !(min..=max).contains(&v) => Err(GenerationError::Validation(format!(
            "{name} must be between {min} and {max} (got {v})"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
