// Path template and JSON value helpers
//
// Templates look like `/accounts/{id}/entitlements`. Concrete values are
// harvested from live records and written back into templates and request
// bodies.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;

lazy_static! {
    static ref TEMPLATE_PARAM: Regex = Regex::new(r"\{([^}]+)\}").unwrap();
}

/// A `{name}` segment located in a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParam {
    pub name: String,
    pub span: Range<usize>,
}

pub fn has_template_params(path: &str) -> bool {
    TEMPLATE_PARAM.is_match(path)
}

/// The leftmost unresolved parameter.
pub fn first_template_param(path: &str) -> Option<TemplateParam> {
    let cap = TEMPLATE_PARAM.captures(path)?;
    let whole = cap.get(0)?;
    Some(TemplateParam {
        name: cap.get(1)?.as_str().to_string(),
        span: whole.range(),
    })
}

/// Replace the segment at `param.span` with `value`.
pub fn replace_param(path: &str, param: &TemplateParam, value: &str) -> String {
    let mut out = String::with_capacity(path.len() + value.len());
    out.push_str(&path[..param.span.start]);
    out.push_str(value);
    out.push_str(&path[param.span.end..]);
    out
}

/// Everything before the parameter's segment, without the trailing slash.
pub fn collection_prefix(path: &str, param: &TemplateParam) -> String {
    path[..param.span.start].trim_end_matches('/').to_string()
}

/// Path up to and including the segment that starts at `start`, after that
/// segment has been substituted.
pub fn truncate_after_segment(path: &str, start: usize) -> &str {
    match path[start..].find('/') {
        Some(offset) => &path[..start + offset],
        None => path,
    }
}

/// Pair template parameters with the segments of a concrete path.
pub fn extract_path_params(template: &str, concrete: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let template_segments = template.split('/');
    let concrete_segments: Vec<&str> = concrete.split('/').collect();
    if template.split('/').count() != concrete_segments.len() {
        return values;
    }
    for (t, c) in template_segments.zip(concrete_segments) {
        if let Some(param) = first_template_param(t) {
            if param.span == (0..t.len()) {
                values.insert(param.name, c.to_string());
            }
        }
    }
    values
}

/// Follow a dotted path (`owner.id`) through nested objects.
pub fn lookup_path<'v>(value: &'v Value, dotted: &str) -> Option<&'v Value> {
    match dotted.split_once('.') {
        None => value.as_object()?.get(dotted),
        Some((head, rest)) => lookup_path(value.as_object()?.get(head)?, rest),
    }
}

/// Render a scalar as a path segment.
pub fn segment_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Identifier for `key` in a record: the field named like the parameter,
/// else `id`, else `name`.
pub fn find_value_by_key(record: &Value, key: &str) -> Option<String> {
    let object = record.as_object()?;
    [key, "id", "name"]
        .iter()
        .find_map(|k| object.get(*k).and_then(segment_value))
}

/// Replace values of keys named in `param_map` anywhere in a JSON body.
pub fn substitute_params(json: &mut Value, param_map: &HashMap<String, String>) {
    match json {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if let Some(new_val) = param_map.get(k) {
                    *v = Value::String(new_val.clone());
                } else {
                    substitute_params(v, param_map);
                }
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                substitute_params(v, param_map);
            }
        }
        _ => {}
    }
}
