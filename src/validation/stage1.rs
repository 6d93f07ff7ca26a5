//! Stage 1 — Parse: strict JSON object parsing, no leniency.

use crate::error::ValidationError;
use serde_json::Value;

fn input_prefix(content: &str) -> String {
    content.chars().take(500).collect()
}

/// Parse `content` as a JSON object. Arrays, scalars, empty/whitespace
/// input, and syntactically invalid JSON are all rejected.
pub fn parse(content: &str) -> Result<Value, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::JsonParse {
            message: "response body is empty or whitespace".to_string(),
            input_prefix: input_prefix(content),
        });
    }

    let value: Value = serde_json::from_str(content).map_err(|e| ValidationError::JsonParse {
        message: e.to_string(),
        input_prefix: input_prefix(content),
    })?;

    if !value.is_object() {
        return Err(ValidationError::JsonParse {
            message: format!(
                "expected a JSON object at the top level, got {}",
                json_kind(&value)
            ),
            input_prefix: input_prefix(content),
        });
    }

    Ok(value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
