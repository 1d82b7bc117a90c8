// Response shape helpers
// Collection endpoints answer with a bare array or an `items` envelope;
// single-resource endpoints answer with one object.

use serde_json::Value;

/// Records carried by a response body.
pub fn records(body: &Value) -> Vec<&Value> {
    match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ if map.is_empty() => Vec::new(),
            _ => vec![body],
        },
        _ => Vec::new(),
    }
}

pub fn has_records(body: &Value) -> bool {
    !records(body).is_empty()
}

/// Whether a body carries anything at all; `null`, `""`, `[]` and `{}` do not.
pub fn is_non_empty(body: &Value) -> bool {
    match body {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}
