// Response schema validation
//
// Bodies are checked with the jsonschema crate; violations are collapsed to
// one entry per schema rule. Keys the schema never declares are reported
// separately as additional properties.

use crate::client::{ApiClient, ApiRequest};
use crate::models::{EndpointStatus, ErrorEntry, Method, ValidationReport};
use crate::request_body::create_request_body;
use crate::response_analysis::is_non_empty;
use crate::spec::{first_branch, schema_type};
use crate::validators::properties::record_schema;
use crate::validators::EndpointTarget;
use serde_json::{Map, Value};

/// Dotted names of keys in `data` that `properties` does not declare.
///
/// Nested objects and the first item of object arrays are walked. A missing
/// `properties` map means the schema is open and nothing is reported.
pub fn find_additional_properties(
    prefix: &str,
    data: &Value,
    properties: Option<&Map<String, Value>>,
) -> Vec<String> {
    let (Some(object), Some(properties)) = (data.as_object(), properties) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for (key, value) in object {
        let dotted = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let Some(declared) = properties.get(key) else {
            found.push(dotted);
            continue;
        };
        let declared = first_branch(declared);

        match value {
            Value::Array(items) => {
                let Some(first @ Value::Object(_)) = items.first() else {
                    continue;
                };
                if schema_type(declared) != Some("array") {
                    continue;
                }
                let Some(item_schema) = declared.get("items").map(first_branch) else {
                    continue;
                };
                if schema_type(item_schema) == Some("object") || item_schema.get("properties").is_some() {
                    found.extend(find_additional_properties(
                        &dotted,
                        first,
                        item_schema.get("properties").and_then(Value::as_object),
                    ));
                }
            }
            Value::Object(_) => found.extend(find_additional_properties(
                &dotted,
                value,
                declared.get("properties").and_then(Value::as_object),
            )),
            _ => {}
        }
    }
    found
}

/// The record a violation at `instance_path` belongs to.
fn offending_record(body: &Value, instance_path: &str) -> Option<Value> {
    match body {
        Value::Array(items) => instance_path
            .split('/')
            .nth(1)
            .and_then(|segment| segment.parse::<usize>().ok())
            .and_then(|index| items.get(index))
            .cloned(),
        other => Some(other.clone()),
    }
}

/// Validate `body` against `schema` and record mismatches and additional
/// properties on `report`.
pub fn check_payload(schema: &Value, body: &Value, report: &mut ValidationReport) {
    let schema = first_branch(schema);
    let validator = match jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .build(schema)
    {
        Ok(validator) => validator,
        Err(err) => {
            tracing::warn!(endpoint = %report.endpoint, error = %err, "response schema does not compile");
            report.flag(EndpointStatus::InvalidSchema);
            report.insert_entry("Invalid schema", ErrorEntry::new(err.to_string()));
            return;
        }
    };

    for err in validator.iter_errors(body) {
        let instance_path = err.instance_path.to_string();
        let target = if instance_path.is_empty() {
            "response body"
        } else {
            instance_path.as_str()
        };
        let message = format!(
            "Expected that {} {}. Actual value is {}.",
            target, err, err.instance
        );
        let entry = match offending_record(body, &instance_path) {
            Some(record) => ErrorEntry::with_data(message, record),
            None => ErrorEntry::new(message),
        };
        report.flag(EndpointStatus::ApiSchemaMismatch);
        report.insert_entry(err.schema_path.to_string(), entry);
    }

    let record = match body {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return,
        },
        other => other,
    };
    let properties = record_schema(schema).get("properties").and_then(Value::as_object);
    for name in find_additional_properties("", record, properties) {
        report.flag(EndpointStatus::AdditionalProperties);
        let message = format!(
            "\"{}\" is an additional property returned by the server, but it is not documented in the specification.",
            name
        );
        report.insert_entry(name, ErrorEntry::with_data(message, record.clone()));
    }
}

/// Schema conformance of a GET at its resolved path.
pub async fn validate_schema(client: &dyn ApiClient, target: &EndpointTarget<'_>) -> ValidationReport {
    let mut report = target.report();
    let Some(schema) = target.operation.response_schema(&["200"]) else {
        report.flag(EndpointStatus::SchemaNotFound);
        report.insert_entry(
            "Schema not found",
            ErrorEntry::new("Schema not found under 200 response"),
        );
        return report;
    };

    let response = match client.get(&target.concrete_path, &[]).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(path = %target.concrete_path, error = %err, "schema probe failed");
            report.flag(EndpointStatus::ApiError);
            return report;
        }
    };
    if !is_non_empty(&response.body) {
        report.flag(EndpointStatus::NoData);
        return report;
    }

    check_payload(schema, &response.body, &mut report);
    report
}

/// Create a record through a POST collection endpoint, validate what comes
/// back, then delete it again.
pub async fn validate_create(client: &dyn ApiClient, target: &EndpointTarget<'_>) -> ValidationReport {
    let mut report = target.report();
    let Some(schema) = target.operation.response_schema(&["201", "202"]) else {
        report.flag(EndpointStatus::SchemaNotFound);
        report.insert_entry(
            "Schema not found",
            ErrorEntry::new("Schema not found under 201 or 202 response"),
        );
        return report;
    };

    let mut request = ApiRequest::new(Method::POST, target.concrete_path.clone());
    if let Some((content_type, body)) = create_request_body(&target.operation) {
        tracing::debug!(path = %target.concrete_path, body = %body, "create probe body");
        request = request.json(body).content_type(content_type);
    }

    let response = match client.execute(request).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            let detail = response
                .body
                .get("detailCode")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            report.flag(EndpointStatus::ApiError);
            report.insert_entry("Request failed", ErrorEntry::new(detail));
            return report;
        }
        Err(err) => {
            report.flag(EndpointStatus::ApiError);
            report.insert_entry("Request failed", ErrorEntry::new(err.to_string()));
            return report;
        }
    };

    if let Some(id) = response.body.get("id").and_then(Value::as_str) {
        cleanup(client, &target.concrete_path, id).await;
    }
    if !response.body.is_null() {
        check_payload(schema, &response.body, &mut report);
    }
    report
}

async fn cleanup(client: &dyn ApiClient, path: &str, id: &str) {
    let path = format!("{}/{}", path.trim_end_matches('/'), id);
    match client.send(ApiRequest::new(Method::DELETE, path.clone())).await {
        Ok(_) => tracing::info!(path = %path, "deleted created record"),
        Err(err) => tracing::warn!(path = %path, error = %err, "cleanup of created record failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::error::HttpError;
    use crate::models::Finding;
    use crate::spec::SpecDocument;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct StaticClient {
        status: u16,
        body: Value,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl StaticClient {
        fn new(status: u16, body: Value) -> Self {
            Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ApiClient for StaticClient {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, HttpError> {
            let method = request.method;
            let url = request.path.clone();
            self.seen.lock().unwrap().push(request);
            let status = if method == Method::DELETE { 204 } else { self.status };
            Ok(ApiResponse {
                method,
                url,
                status,
                body: if method == Method::DELETE { Value::Null } else { self.body.clone() },
            })
        }
    }

    fn widgets_spec() -> SpecDocument {
        SpecDocument::new(
            "v3",
            json!({"paths": {"/widgets": {
                "get": {
                    "tags": ["Widgets"],
                    "responses": {"200": {"content": {"application/json": {"schema": {
                        "type": "array",
                        "items": {"type": "object", "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"}
                        }}
                    }}}}}
                },
                "post": {
                    "requestBody": {"content": {"application/json": {"schema": {
                        "type": "object", "properties": {"name": {"type": "string"}}
                    }}}},
                    "responses": {"201": {"content": {"application/json": {"schema": {
                        "type": "object", "properties": {
                            "id": {"type": "string"},
                            "name": {"type": "string"}
                        }
                    }}}}}
                }
            }}}),
        )
    }

    fn keys(report: &ValidationReport) -> Vec<&str> {
        report.errors.keys().map(String::as_str).collect()
    }

    #[test]
    fn additional_properties_walk_nested_objects_and_object_arrays() {
        let schema = json!({
            "id": {"type": "integer"},
            "owner": {"type": "object", "properties": {"id": {"type": "string"}}},
            "items": {"type": "array", "items": {"type": "object", "properties": {"sku": {"type": "string"}}}}
        });
        let data = json!({
            "id": 1,
            "extra": true,
            "owner": {"id": "a", "email": "x"},
            "items": [{"sku": "s", "price": 2}]
        });
        let mut found = find_additional_properties("", &data, schema.as_object());
        found.sort();
        assert_eq!(found, vec!["extra", "items.price", "owner.email"]);
    }

    #[test]
    fn open_schema_reports_nothing() {
        let data = json!({"anything": 1});
        assert!(find_additional_properties("", &data, None).is_empty());
    }

    #[tokio::test]
    async fn extra_field_yields_one_additional_property() {
        let doc = widgets_spec();
        let op = doc.operation("/widgets", Method::GET).unwrap();
        let client = StaticClient::new(200, json!([{"id": 1, "name": "x", "extra": true}]));
        let report = validate_schema(&client, &EndpointTarget::new(op, "/widgets")).await;

        assert_eq!(keys(&report), vec!["extra"]);
        assert_eq!(report.status, vec![EndpointStatus::AdditionalProperties]);
        assert_eq!(report.tag.as_deref(), Some("Widgets"));
        match &report.errors["extra"] {
            Finding::Entry(entry) => assert_eq!(
                entry.message,
                "\"extra\" is an additional property returned by the server, but it is not documented in the specification."
            ),
            other => panic!("unexpected finding {:?}", other),
        }
    }

    #[tokio::test]
    async fn repeated_violations_collapse_per_rule() {
        let doc = widgets_spec();
        let op = doc.operation("/widgets", Method::GET).unwrap();
        let client = StaticClient::new(
            200,
            json!([{"id": "a", "name": "x"}, {"id": "b", "name": "y"}]),
        );
        let report = validate_schema(&client, &EndpointTarget::new(op, "/widgets")).await;

        assert_eq!(report.status, vec![EndpointStatus::ApiSchemaMismatch]);
        assert_eq!(report.errors.len(), 1);
        let Finding::Entry(entry) = report.errors.values().next().unwrap() else {
            panic!("expected keyed entry");
        };
        assert!(entry.message.starts_with("Expected that /0/id"));
        assert_eq!(entry.data, Some(json!({"id": "a", "name": "x"})));
    }

    #[tokio::test]
    async fn empty_body_is_no_data() {
        let doc = widgets_spec();
        let op = doc.operation("/widgets", Method::GET).unwrap();
        let client = StaticClient::new(200, json!([]));
        let report = validate_schema(&client, &EndpointTarget::new(op, "/widgets")).await;
        assert_eq!(report.status, vec![EndpointStatus::NoData]);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_is_api_error() {
        let doc = widgets_spec();
        let op = doc.operation("/widgets", Method::GET).unwrap();
        let client = StaticClient::new(500, json!({"detailCode": "boom"}));
        let report = validate_schema(&client, &EndpointTarget::new(op, "/widgets")).await;
        assert_eq!(report.status, vec![EndpointStatus::ApiError]);
    }

    #[tokio::test]
    async fn missing_schema_is_reported() {
        let doc = SpecDocument::new("v3", json!({"paths": {"/plain": {"get": {"responses": {}}}}}));
        let op = doc.operation("/plain", Method::GET).unwrap();
        let client = StaticClient::new(200, json!({}));
        let report = validate_schema(&client, &EndpointTarget::new(op, "/plain")).await;
        assert_eq!(report.status, vec![EndpointStatus::SchemaNotFound]);
        assert_eq!(keys(&report), vec!["Schema not found"]);
    }

    #[test]
    fn uncompilable_schema_is_invalid() {
        let mut report = ValidationReport::new(Method::GET, "/v3/broken", None);
        check_payload(&json!({"type": "not-a-type"}), &json!({}), &mut report);
        assert_eq!(report.status, vec![EndpointStatus::InvalidSchema]);
        assert_eq!(keys(&report), vec!["Invalid schema"]);
    }

    #[tokio::test]
    async fn create_posts_validates_and_cleans_up() {
        let doc = widgets_spec();
        let op = doc.operation("/widgets", Method::POST).unwrap();
        let client = StaticClient::new(201, json!({"id": "w-1", "name": "example"}));
        let report = validate_create(&client, &EndpointTarget::new(op, "/widgets")).await;

        assert!(report.is_clean());
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].body, Some(json!({"name": "example"})));
        assert_eq!(seen[1].method, Method::DELETE);
        assert_eq!(seen[1].path, "/widgets/w-1");
    }

    #[tokio::test]
    async fn failed_create_carries_detail_code() {
        let doc = widgets_spec();
        let op = doc.operation("/widgets", Method::POST).unwrap();
        let client = StaticClient::new(400, json!({"detailCode": "400.1 Bad Request Content"}));
        let report = validate_create(&client, &EndpointTarget::new(op, "/widgets")).await;

        assert_eq!(
            report.errors.get("Request failed"),
            Some(&Finding::Entry(ErrorEntry::new("400.1 Bad Request Content")))
        );
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }
}
