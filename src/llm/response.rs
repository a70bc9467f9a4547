//! Completion parsing — text extraction, truncation check, schema decode.

use serde_json::Value;

use super::schema::validate_against_schema;
use super::types::{ChatCompletion, Completion, ResponseSchema};
use crate::error::GenerationError;

const CONTENT_PREVIEW_CHARS: usize = 200;

/// `finish_reason` the upstream reports when it hit the token limit.
const TRUNCATED_FINISH_REASON: &str = "length";

/// Turn an upstream completion into the value the caller asked for.
///
/// # Errors
///
/// Returns [`GenerationError::Parse`] when there is no content, when the
/// output was truncated, or when structured output fails to decode or
/// validate against `schema`.
pub fn parse_completion(
    completion: &ChatCompletion,
    schema: Option<&ResponseSchema>,
) -> Result<Completion, GenerationError> {
    let Some(choice) = completion.choices.first() else {
        return Err(GenerationError::Parse("completion has no choices".into()));
    };
    let content = choice
        .message
        .content
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GenerationError::Parse("completion message has no content".into()))?;

    // EDGE: a cut-off JSON object can still decode; never accept it.
    if choice.finish_reason.as_deref() == Some(TRUNCATED_FINISH_REASON) {
        return Err(GenerationError::Parse(format!(
            "completion truncated at token limit: {}",
            preview(content, CONTENT_PREVIEW_CHARS)
        )));
    }

    let Some(schema) = schema else {
        return Ok(Completion::Text(content.to_string()));
    };

    let value: Value = serde_json::from_str(content.trim()).map_err(|e| {
        GenerationError::Parse(format!(
            "completion is not valid JSON ({e}): {}",
            preview(content, CONTENT_PREVIEW_CHARS)
        ))
    })?;
    validate_against_schema(&value, &schema.schema)
        .map_err(|violation| GenerationError::Parse(format!("schema '{}': {violation}", schema.name)))?;
    Ok(Completion::Structured(value))
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() { format!("{head}...") } else { head }
}

#[cfg(test)]
#[path = "response_test.rs"]
mod tests;
