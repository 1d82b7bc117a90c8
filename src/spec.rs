// Read-only views over dereferenced API descriptions
//
// A SpecSet holds one document per API version. Operations, parameters and
// schemas are borrowed straight out of the underlying JSON.

use crate::models::Method;
use serde_json::Value;
use std::collections::BTreeMap;

/// Versions in fallback order when an operation is looked up across versions.
pub const VERSION_PRIORITY: [&str; 3] = ["v2024", "v3", "beta"];

pub const USER_LEVELS_EXTENSION: &str = "x-sailpoint-userLevels";
pub const PRODUCER_EXTENSION: &str = "x-sailpoint-resource-operation-id";

#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    pub version: String,
    pub document: Value,
}

impl SpecDocument {
    pub fn new(version: impl Into<String>, document: Value) -> Self {
        Self {
            version: version.into(),
            document,
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.document
            .get("paths")
            .and_then(Value::as_object)
            .map(|paths| paths.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn operation(&self, path: &str, method: Method) -> Option<Operation<'_>> {
        let (path_key, path_item) = self
            .document
            .get("paths")?
            .as_object()?
            .get_key_value(path)?;
        let node = path_item.get(method.spec_key())?;
        Some(Operation {
            version: &self.version,
            path: path_key,
            method,
            node,
            path_item,
        })
    }

    /// Every operation under `path`, in path-item key order.
    pub fn operations_at(&self, path: &str) -> Vec<Operation<'_>> {
        let Some(path_item) = self
            .document
            .get("paths")
            .and_then(|paths| paths.get(path))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };
        path_item
            .keys()
            .filter_map(|key| Method::from_spec_key(key))
            .filter_map(|method| self.operation(path, method))
            .collect()
    }

    /// First server URL with `{tenant}` and declared variable defaults filled in.
    pub fn server_url(&self, tenant: &str) -> Option<String> {
        let server = self.document.get("servers")?.as_array()?.first()?;
        let mut url = server.get("url")?.as_str()?.to_string();
        url = url.replace("{tenant}", tenant);
        if let Some(vars) = server.get("variables").and_then(Value::as_object) {
            for (k, v) in vars {
                if let Some(def) = v.get("default").and_then(Value::as_str) {
                    url = url.replace(&format!("{{{}}}", k), def);
                }
            }
        }
        Some(url.trim_end_matches('/').to_string())
    }
}

/// First alternative of an `anyOf`/`oneOf` schema, else the schema itself.
pub fn first_branch(schema: &Value) -> &Value {
    ["anyOf", "oneOf"]
        .iter()
        .find_map(|key| schema.get(*key)?.as_array()?.first())
        .unwrap_or(schema)
}

/// Declared type of a schema. For normalized nullable unions this is the
/// first non-null member.
pub fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(ty) => Some(ty.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null"),
        _ => None,
    }
}

/// One method under one path of one document.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub version: &'a str,
    pub path: &'a str,
    pub method: Method,
    pub node: &'a Value,
    path_item: &'a Value,
}

impl<'a> Operation<'a> {
    pub fn operation_id(&self) -> Option<&'a str> {
        self.node.get("operationId").and_then(Value::as_str)
    }

    pub fn tag(&self) -> Option<String> {
        self.node
            .get("tags")
            .and_then(Value::as_array)
            .and_then(|tags| tags.first())
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Operation parameters followed by path-level ones not overridden.
    pub fn parameters(&self) -> Vec<Parameter<'a>> {
        let own: Vec<Parameter<'a>> = self
            .node
            .get("parameters")
            .and_then(Value::as_array)
            .map(|params| params.iter().map(Parameter::new).collect())
            .unwrap_or_default();
        let inherited = self
            .path_item
            .get("parameters")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(Parameter::new)
            .filter(|p| !own.iter().any(|o| o.name() == p.name()));
        let mut all = own.clone();
        all.extend(inherited);
        all
    }

    pub fn parameter(&self, name: &str) -> Option<Parameter<'a>> {
        self.parameters().into_iter().find(|p| p.name() == Some(name))
    }

    /// `application/json` schema of the first listed status that has one.
    pub fn response_schema(&self, statuses: &[&str]) -> Option<&'a Value> {
        let responses = self.node.get("responses")?;
        statuses.iter().find_map(|status| {
            responses
                .get(*status)?
                .get("content")?
                .get("application/json")?
                .get("schema")
        })
    }

    /// Request body schema with its content type, JSON preferred over JSON-patch.
    pub fn request_schema(&self) -> Option<(&'static str, &'a Value)> {
        let content = self.node.get("requestBody")?.get("content")?;
        ["application/json", "application/json-patch+json"]
            .into_iter()
            .find_map(|ct| content.get(ct)?.get("schema").map(|schema| (ct, schema)))
    }

    /// Privilege levels the operation documents, if it documents any.
    pub fn user_levels(&self) -> Option<Vec<String>> {
        let levels = self.node.get(USER_LEVELS_EXTENSION)?.as_array()?;
        Some(
            levels
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Parameter<'a> {
    pub node: &'a Value,
}

impl<'a> Parameter<'a> {
    pub fn new(node: &'a Value) -> Self {
        Self { node }
    }

    pub fn name(&self) -> Option<&'a str> {
        self.node.get("name").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&'a str> {
        self.node.get("description").and_then(Value::as_str)
    }

    /// Declared enum values rendered as path segments.
    pub fn enum_values(&self) -> Option<Vec<String>> {
        let values = self.node.get("schema")?.get("enum")?.as_array()?;
        Some(
            values
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Operation id of the collection endpoint that produces this parameter.
    /// A list-valued extension names its first entry.
    pub fn producer_operation_id(&self) -> Option<&'a str> {
        match self.node.get(PRODUCER_EXTENSION)? {
            Value::String(id) => Some(id.as_str()),
            Value::Array(ids) => ids.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Where an operation lives: version, method and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLocation {
    pub version: String,
    pub method: Method,
    pub path: String,
}

/// All loaded versions. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct SpecSet {
    documents: BTreeMap<String, SpecDocument>,
}

impl SpecSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: SpecDocument) {
        self.documents.insert(document.version.clone(), document);
    }

    pub fn get(&self, version: &str) -> Option<&SpecDocument> {
        self.documents.get(version)
    }

    pub fn documents(&self) -> impl Iterator<Item = &SpecDocument> {
        self.documents.values()
    }

    pub fn versions(&self) -> Vec<&str> {
        self.documents.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Every operation in every version carrying `operation_id`.
    pub fn find_operations_by_id(&self, operation_id: &str) -> Vec<OperationLocation> {
        let mut found = Vec::new();
        for document in self.documents.values() {
            for path in document.paths() {
                for op in document.operations_at(path) {
                    if op.operation_id() == Some(operation_id) {
                        found.push(OperationLocation {
                            version: document.version.clone(),
                            method: op.method,
                            path: path.to_string(),
                        });
                    }
                }
            }
        }
        found
    }

    /// Prefer the candidate in `version`, else the first by version priority.
    pub fn select_by_version<'c>(
        candidates: &'c [OperationLocation],
        version: &str,
    ) -> Option<&'c OperationLocation> {
        candidates
            .iter()
            .find(|c| c.version == version)
            .or_else(|| {
                VERSION_PRIORITY
                    .iter()
                    .find_map(|v| candidates.iter().find(|c| c.version == *v))
            })
    }

    pub fn find_producer(&self, operation_id: &str, version: &str) -> Option<OperationLocation> {
        let candidates = self.find_operations_by_id(operation_id);
        Self::select_by_version(&candidates, version).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(version: &str) -> SpecDocument {
        SpecDocument::new(
            version,
            json!({
                "servers": [{"url": "https://{tenant}.api.identitynow.com/v3"}],
                "paths": {
                    "/accounts": {
                        "get": {
                            "operationId": "listAccounts",
                            "tags": ["Accounts"],
                            "x-sailpoint-userLevels": ["ORG_ADMIN"],
                            "parameters": [
                                {"name": "filters", "in": "query", "description": "**id**: *eq*"}
                            ],
                            "responses": {"200": {"content": {"application/json": {"schema": {"type": "array"}}}}}
                        }
                    },
                    "/accounts/{id}": {
                        "parameters": [
                            {"name": "id", "in": "path", "x-sailpoint-resource-operation-id": "listAccounts"}
                        ],
                        "get": {"operationId": "getAccount"},
                        "patch": {
                            "operationId": "updateAccount",
                            "requestBody": {"content": {"application/json-patch+json": {"schema": {"type": "array"}}}}
                        }
                    }
                }
            }),
        )
    }

    #[test]
    fn operation_exposes_extensions_and_schemas() {
        let document = doc("v3");
        let op = document.operation("/accounts", Method::GET).unwrap();
        assert_eq!(op.operation_id(), Some("listAccounts"));
        assert_eq!(op.tag().as_deref(), Some("Accounts"));
        assert_eq!(op.user_levels(), Some(vec!["ORG_ADMIN".to_string()]));
        assert_eq!(op.parameter("filters").and_then(|p| p.description()), Some("**id**: *eq*"));
        assert_eq!(op.response_schema(&["200"]), Some(&json!({"type": "array"})));
    }

    #[test]
    fn path_level_parameters_are_inherited() {
        let document = doc("v3");
        let op = document.operation("/accounts/{id}", Method::GET).unwrap();
        let id = op.parameter("id").unwrap();
        assert_eq!(id.producer_operation_id(), Some("listAccounts"));

        let patch = document.operation("/accounts/{id}", Method::PATCH).unwrap();
        assert_eq!(patch.request_schema().map(|(ct, _)| ct), Some("application/json-patch+json"));
    }

    #[test]
    fn producer_lookup_falls_back_by_priority() {
        let mut specs = SpecSet::new();
        specs.insert(doc("v3"));
        specs.insert(doc("beta"));

        let exact = specs.find_producer("listAccounts", "beta").unwrap();
        assert_eq!(exact.version, "beta");

        let fallback = specs.find_producer("listAccounts", "v2024").unwrap();
        assert_eq!(fallback.version, "v3");
        assert_eq!(fallback.path, "/accounts");

        assert!(specs.find_producer("missing", "v3").is_none());
    }

    #[test]
    fn first_branch_picks_first_alternative() {
        let schema = json!({"anyOf": [{"type": "array"}, {"type": "object"}]});
        assert_eq!(first_branch(&schema), &json!({"type": "array"}));
        let plain = json!({"type": "object"});
        assert_eq!(first_branch(&plain), &plain);
    }

    #[test]
    fn server_url_substitutes_tenant() {
        assert_eq!(
            doc("v3").server_url("acme").as_deref(),
            Some("https://acme.api.identitynow.com/v3")
        );
    }
}
