// Response properties that can be probed with query operators

use crate::spec::{first_branch, schema_type};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Boolean,
    /// `number` and `integer` alike.
    Number,
    /// Any other scalar or an untyped schema. Sortable, never filtered.
    Unknown,
}

impl PropertyType {
    pub fn from_schema(schema: &Value) -> Self {
        match schema_type(schema) {
            Some("string") => PropertyType::String,
            Some("boolean") => PropertyType::Boolean,
            Some("number") | Some("integer") => PropertyType::Number,
            _ => PropertyType::Unknown,
        }
    }
}

/// A primitive property reachable from the record root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatProperty {
    /// Dotted path, e.g. `owner.id`.
    pub name: String,
    pub ty: PropertyType,
}

/// Record schema of a response: the items schema for arrays, the schema
/// itself otherwise.
pub fn record_schema(response_schema: &Value) -> &Value {
    let schema = first_branch(response_schema);
    if schema_type(schema) == Some("array") {
        if let Some(items) = schema.get("items") {
            return first_branch(items);
        }
    }
    schema
}

/// Flatten a response schema into dotted primitive properties. Nested
/// objects are walked; arrays are left out.
pub fn flatten_properties(response_schema: &Value) -> Vec<FlatProperty> {
    let mut out = Vec::new();
    collect(record_schema(response_schema), "", &mut out);
    out
}

fn collect(schema: &Value, prefix: &str, out: &mut Vec<FlatProperty>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, property) in properties {
        let property = first_branch(property);
        let dotted = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match schema_type(property) {
            Some("object") => collect(property, &dotted, out),
            Some("array") => continue,
            _ if property.get("properties").is_some() => collect(property, &dotted, out),
            _ => out.push(FlatProperty {
                name: dotted,
                ty: PropertyType::from_schema(property),
            }),
        }
    }
}
