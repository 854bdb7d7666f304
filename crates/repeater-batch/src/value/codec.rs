//! Stored-text encoding of meta values.
//!
//! The meta store holds text. Strings go in raw, numbers as decimal text,
//! booleans as `"1"` / `""`, null as `""`, arrays and objects as compact
//! JSON. A raw string that would decode as JSON is JSON-encoded on the way in
//! so it reads back as the same string.

use serde_json::Value;

use crate::error::{RepeaterError, Result};

/// Encode a value for storage.
pub fn serialize_meta_value(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(true) => Ok("1".to_string()),
        Value::Bool(false) => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => {
            if looks_encoded(s) {
                serde_json::to_string(s)
                    .map_err(|e| RepeaterError::Internal(format!("serialize string: {e}")))
            } else {
                Ok(s.clone())
            }
        }
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)
            .map_err(|e| RepeaterError::Internal(format!("serialize container: {e}"))),
    }
}

/// Decode stored text back into a value. Never fails: anything that is not
/// an encoded container or encoded string is a plain string.
pub fn deserialize_meta_value(text: &str) -> Value {
    if might_be_json(text) {
        if let Ok(v @ (Value::Array(_) | Value::Object(_) | Value::String(_))) =
            serde_json::from_str::<Value>(text)
        {
            return v;
        }
    }
    Value::String(text.to_string())
}

fn might_be_json(text: &str) -> bool {
    matches!(text.trim_start().as_bytes().first(), Some(b'{' | b'[' | b'"'))
}

fn looks_encoded(s: &str) -> bool {
    might_be_json(s)
        && matches!(
            serde_json::from_str::<Value>(s),
            Ok(Value::Array(_) | Value::Object(_) | Value::String(_))
        )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
