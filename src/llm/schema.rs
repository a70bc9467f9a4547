//! Structural validation of decoded output against a JSON-Schema object.
//!
//! Only the subset the upstream's strict mode uses is checked: `required`
//! fields at the top level and the primitive `type` of each declared
//! property. Undeclared fields pass through.

use std::fmt;

use serde_json::Value;

/// Why a decoded value does not match its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    NotAnObject { actual: &'static str },
    MissingField { field: String },
    TypeMismatch { field: String, expected: String, actual: &'static str },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { actual } => write!(f, "expected a JSON object, got {actual}"),
            Self::MissingField { field } => write!(f, "missing required field `{field}`"),
            Self::TypeMismatch { field, expected, actual } => {
                write!(f, "field `{field}` expected type {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for SchemaViolation {}

/// Check `value` against `schema`, returning the first violation.
///
/// # Errors
///
/// Returns a [`SchemaViolation`] for a non-object value, a missing required
/// field, or a declared property whose JSON type does not match.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), SchemaViolation> {
    let Some(object) = value.as_object() else {
        return Err(SchemaViolation::NotAnObject { actual: json_type_name(value) });
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(SchemaViolation::MissingField { field: field.to_string() });
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (field, declared) in properties {
        let Some(actual) = object.get(field) else {
            continue;
        };
        let Some(expected) = declared.get("type") else {
            continue;
        };
        if !matches_declared_type(actual, expected) {
            return Err(SchemaViolation::TypeMismatch {
                field: field.clone(),
                expected: describe_declared_type(expected),
                actual: json_type_name(actual),
            });
        }
    }
    Ok(())
}

/// `type` may be a single name or a list of names (`["string", "null"]`).
fn matches_declared_type(value: &Value, declared: &Value) -> bool {
    match declared {
        Value::String(name) => matches_type_name(value, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(value, name)),
        // Unknown declaration shapes are not ours to enforce.
        _ => true,
    }
}

fn matches_type_name(value: &Value, name: &str) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => is_integer(value),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract().abs() < f64::EPSILON)
}

fn describe_declared_type(declared: &Value) -> String {
    match declared {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod tests;
