//! Input validation against JSON schemas

use crate::error::{MediaError, Result};
use serde_json::Value;

/// Validate input against a JSON schema
pub fn validate_input(input: &Value, schema: &Value) -> Result<()> {
    if !input.is_object() {
        return Err(MediaError::validation("Input must be a JSON object"));
    }

    // Get required fields from schema
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field_name in required {
            let field_str = field_name.as_str().ok_or_else(|| {
                MediaError::validation("Invalid schema: required field not a string")
            })?;

            if input.get(field_str).map_or(true, Value::is_null) {
                return Err(MediaError::validation(format!(
                    "Missing required field: {}",
                    field_str
                )));
            }
        }
    }

    // Validate property types
    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        if let Some(input_obj) = input.as_object() {
            for (key, value) in input_obj {
                if let Some(prop_schema) = properties.get(key) {
                    validate_type(key, value, prop_schema)?;
                }
            }
        }
    }

    Ok(())
}

/// Validate that a value matches the expected type
fn validate_type(key: &str, value: &Value, schema: &Value) -> Result<()> {
    if let Some(expected_type) = schema.get("type").and_then(|t| t.as_str()) {
        let valid = match expected_type {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true, // Unknown types pass validation
        };

        if !valid {
            return Err(MediaError::validation(format!(
                "Type mismatch for {}: expected {}, got {}",
                key, expected_type, value
            )));
        }
    }

    if let (Some(min), Some(items)) = (
        schema.get("minItems").and_then(|m| m.as_u64()),
        value.as_array(),
    ) {
        if (items.len() as u64) < min {
            return Err(MediaError::validation(format!(
                "{} needs at least {} item(s)",
                key, min
            )));
        }
    }

    Ok(())
}
