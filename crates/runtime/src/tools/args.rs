//! Tool argument decoding.

use super::ToolError;
use serde_json::{Map, Value};

/// Decoded tool arguments, keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// Decode a raw JSON argument string into an argument map.
///
/// A blank string decodes to an empty map. Anything else must be a JSON
/// object.
pub fn decode_arguments(raw: &str) -> Result<Arguments, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Arguments::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::Decode(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(ToolError::Decode(e.to_string())),
    }
}

/// Read a string parameter, if present and actually a string.
pub fn string_arg<'a>(arguments: &'a Arguments, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
