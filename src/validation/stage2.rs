//! Stage 2 — Schema: Draft-7 validation against the fixed
//! `email_triage_v2` schema, collecting every violation rather than
//! failing on the first.

use crate::error::ValidationError;
use serde_json::Value;

const MAX_VIOLATIONS: usize = 10;

/// The schema file may be the raw Draft-7 schema, or wrapped as
/// `{"name": "...", "schema": {...}}`. Loader must handle both shapes
/// (`spec.md` §9 open question).
pub fn unwrap_schema(raw: &Value) -> &Value {
    match raw.as_object() {
        Some(map) if map.contains_key("name") && map.contains_key("schema") => {
            &map["schema"]
        }
        _ => raw,
    }
}

pub fn build_validator(raw: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::validator_for(unwrap_schema(raw)).map_err(|e| e.to_string())
}

/// Validate `instance` against `validator`, returning every violation
/// (capped at the first 10) as a formatted `"{pointer}: {message}"`.
pub fn validate(instance: &Value, validator: &jsonschema::Validator) -> Result<(), ValidationError> {
    let violations: Vec<String> = validator
        .iter_errors(instance)
        .take(MAX_VIOLATIONS)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Schema { violations })
    }
}
