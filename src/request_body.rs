// Request body synthesis
// Builds a plausible body from a request schema so write operations can be
// probed without hand-written fixtures.

use crate::client::{JSON_CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE};
use crate::models::Method;
use crate::spec::{first_branch, schema_type, Operation};
use serde_json::{json, Map, Value};

/// Minimal JSON-patch document used for every PATCH probe.
pub fn json_patch_body() -> Value {
    json!([{"op": "replace", "path": "/description", "value": ""}])
}

/// Materialize an example value for `schema`.
///
/// Read-only schemas produce nothing. Declared examples win; otherwise
/// objects are built from their properties, arrays hold one item and
/// scalars get a fixed placeholder.
pub fn synthesize_example(schema: &Value) -> Option<Value> {
    if schema.get("readOnly").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    let schema = first_branch(schema);
    let example = schema.get("example").cloned();

    match schema_type(schema) {
        Some("object") => {
            if example.is_some() {
                return example;
            }
            let mut object = Map::new();
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (name, property) in properties {
                    if let Some(value) = synthesize_example(property) {
                        object.insert(name.clone(), value);
                    }
                }
            }
            Some(Value::Object(object))
        }
        Some("array") => {
            let items = schema.get("items");
            let items_have_example = items.map_or(false, |i| i.get("example").is_some());
            if example.is_some() && !items_have_example {
                return example;
            }
            let item = items.and_then(synthesize_example);
            Some(Value::Array(item.into_iter().collect()))
        }
        Some(scalar) => example
            .or_else(|| {
                schema
                    .get("enum")
                    .and_then(Value::as_array)
                    .and_then(|values| values.first().cloned())
            })
            .or(match scalar {
                "string" => Some(json!("example")),
                "integer" | "number" => Some(json!(1)),
                "boolean" => Some(json!(true)),
                _ => None,
            }),
        // Untyped schemas with properties are objects in practice
        None if schema.get("properties").is_some() => {
            let mut typed = schema.clone();
            typed["type"] = json!("object");
            synthesize_example(&typed)
        }
        None => example,
    }
}

/// Content type and body for a probe of `operation`, if it needs one.
pub fn create_request_body(operation: &Operation<'_>) -> Option<(&'static str, Value)> {
    match operation.method {
        Method::PATCH => Some((JSON_PATCH_CONTENT_TYPE, json_patch_body())),
        method if method.carries_body() => {
            let (content_type, schema) = operation.request_schema()?;
            let body = synthesize_example(schema)?;
            let content_type = if content_type == JSON_PATCH_CONTENT_TYPE {
                JSON_PATCH_CONTENT_TYPE
            } else {
                JSON_CONTENT_TYPE
            };
            Some((content_type, body))
        }
        _ => None,
    }
}
