// OpenAPI loader for Specter
// Reads JSON or YAML descriptions, inlines $ref pointers and normalizes
// OpenAPI 3.0 `nullable` so the schema validator accepts documented nulls.

use crate::error::SpecError;
use crate::parsers::SpecSource;
use crate::spec::{SpecDocument, SpecSet};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Maximum nesting of `$ref` expansion. Deeper references are left as an
/// empty (permissive) schema.
pub const MAX_REF_DEPTH: usize = 32;

lazy_static! {
    static ref VERSION_SEGMENT: Regex = Regex::new(r"^(v\d+|beta)$").unwrap();
}

pub struct OpenApiLoader;

impl OpenApiLoader {
    /// Read one file as JSON or YAML depending on its extension.
    fn read_value(path: &Path) -> Result<Value, SpecError> {
        let display = path.display().to_string();
        let data = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: display.clone(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml");
        if is_yaml {
            serde_yaml::from_str::<Value>(&data).map_err(|e| SpecError::Parse {
                path: display,
                message: e.to_string(),
            })
        } else {
            serde_json::from_str::<Value>(&data).map_err(|e| SpecError::Parse {
                path: display,
                message: e.to_string(),
            })
        }
    }

    /// Load, dereference and normalize a single description file.
    pub fn load_file(path: &Path) -> Result<SpecDocument, SpecError> {
        let raw = Self::read_value(path)?;
        if raw.get("paths").and_then(Value::as_object).is_none() {
            return Err(SpecError::Parse {
                path: path.display().to_string(),
                message: "document has no `paths` object".to_string(),
            });
        }

        let mut resolver = RefResolver::new(&raw, Some(path));
        let mut document = resolver.dereference(&raw, 0);
        normalize_nullable(&mut document);

        let version = infer_version(&document, path);
        tracing::debug!(path = %path.display(), version = %version, "loaded API description");
        Ok(SpecDocument::new(version, document))
    }

    fn is_description_file(path: &Path) -> bool {
        path.extension()
            .map_or(false, |ext| ext == "json" || ext == "yaml" || ext == "yml")
    }
}

impl SpecSource for OpenApiLoader {
    fn load(&self, location: &str) -> Result<SpecSet, SpecError> {
        let root = Path::new(location);
        let mut specs = SpecSet::new();

        if root.is_file() {
            specs.insert(Self::load_file(root)?);
            return Ok(specs);
        }

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || !Self::is_description_file(path) {
                continue;
            }
            match Self::load_file(path) {
                Ok(document) => specs.insert(document),
                // Fragments referenced from a main description have no paths.
                Err(err) => tracing::debug!(path = %path.display(), error = %err, "skipping file"),
            }
        }

        if specs.is_empty() {
            return Err(SpecError::Empty(location.to_string()));
        }
        Ok(specs)
    }
}

/// Version from the last segment of `servers[0].url`, else from the file stem
/// (`sailpoint-api.v3.yaml` -> `v3`).
pub fn infer_version(document: &Value, path: &Path) -> String {
    let from_server = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| VERSION_SEGMENT.is_match(segment))
        .map(str::to_string);
    if let Some(version) = from_server {
        return version;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let from_stem = stem
        .split(['.', '_', '-'])
        .rev()
        .find(|part| VERSION_SEGMENT.is_match(part))
        .map(str::to_string);
    from_stem.unwrap_or(stem)
}

/// Inlines `$ref` pointers. Local pointers resolve against the root document;
/// relative file references resolve next to the description file and may not
/// leave its directory.
struct RefResolver<'a> {
    root: &'a Value,
    base_path: Option<&'a Path>,
    external_cache: HashMap<PathBuf, Value>,
    active: Vec<String>,
}

impl<'a> RefResolver<'a> {
    fn new(root: &'a Value, base_path: Option<&'a Path>) -> Self {
        Self {
            root,
            base_path,
            external_cache: HashMap::new(),
            active: Vec::new(),
        }
    }

    fn dereference(&mut self, value: &Value, depth: usize) -> Value {
        match value {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    return self.expand(reference, depth);
                }
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.dereference(child, depth));
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.dereference(item, depth)).collect())
            }
            other => other.clone(),
        }
    }

    fn expand(&mut self, reference: &str, depth: usize) -> Value {
        if depth >= MAX_REF_DEPTH || self.active.iter().any(|r| r == reference) {
            tracing::debug!(reference, depth, "recursive $ref left unexpanded");
            return Value::Object(Map::new());
        }
        let Some(target) = self.lookup(reference) else {
            tracing::warn!(reference, "unresolvable $ref");
            return Value::Object(Map::new());
        };
        self.active.push(reference.to_string());
        let expanded = self.dereference(&target, depth + 1);
        self.active.pop();
        expanded
    }

    fn lookup(&mut self, reference: &str) -> Option<Value> {
        let (file_part, pointer) = reference.split_once('#').unwrap_or((reference, ""));
        if file_part.is_empty() {
            return self.root.pointer(pointer).cloned();
        }
        self.lookup_external(file_part, pointer)
    }

    fn lookup_external(&mut self, file_part: &str, pointer: &str) -> Option<Value> {
        let spec_dir = self.base_path?.parent()?;
        let canonical = spec_dir.join(file_part).canonicalize().ok()?;

        // Reject references that escape the description's directory
        let canonical_dir = spec_dir.canonicalize().ok()?;
        if !canonical.starts_with(&canonical_dir) {
            tracing::warn!(reference = file_part, "rejected $ref outside the description directory");
            return None;
        }

        if !self.external_cache.contains_key(&canonical) {
            let loaded = OpenApiLoader::read_value(&canonical).ok()?;
            self.external_cache.insert(canonical.clone(), loaded);
        }
        let document = self.external_cache.get(&canonical)?;
        if pointer.is_empty() {
            Some(document.clone())
        } else {
            document.pointer(pointer).cloned()
        }
    }
}

/// Rewrite `nullable: true` into a type union (and a null enum member).
pub fn normalize_nullable(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("nullable").and_then(Value::as_bool) == Some(true) {
                map.remove("nullable");
                if let Some(Value::String(ty)) = map.get("type") {
                    let union = Value::Array(vec![Value::String(ty.clone()), Value::String("null".into())]);
                    map.insert("type".to_string(), union);
                }
                if let Some(Value::Array(values)) = map.get_mut("enum") {
                    if !values.contains(&Value::Null) {
                        values.push(Value::Null);
                    }
                }
            }
            for child in map.values_mut() {
                normalize_nullable(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_nullable),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_refs_are_inlined() {
        let root = json!({
            "paths": {"/a": {"get": {"responses": {"200": {"$ref": "#/components/responses/Ok"}}}}},
            "components": {
                "responses": {"Ok": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/A"}}}}},
                "schemas": {"A": {"type": "object", "properties": {"id": {"type": "string"}}}}
            }
        });
        let mut resolver = RefResolver::new(&root, None);
        let out = resolver.dereference(&root, 0);
        assert_eq!(
            out.pointer("/paths/~1a/get/responses/200/content/application~1json/schema/properties/id/type"),
            Some(&json!("string"))
        );
    }

    #[test]
    fn self_referential_schema_terminates() {
        let root = json!({
            "components": {"schemas": {"Node": {
                "type": "object",
                "properties": {"child": {"$ref": "#/components/schemas/Node"}}
            }}},
            "paths": {"/n": {"get": {"schema": {"$ref": "#/components/schemas/Node"}}}}
        });
        let mut resolver = RefResolver::new(&root, None);
        let out = resolver.dereference(&root, 0);
        assert_eq!(
            out.pointer("/paths/~1n/get/schema/properties/child"),
            Some(&json!({}))
        );
    }

    #[test]
    fn nullable_becomes_type_union() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "owner": {"type": "string", "nullable": true},
                "state": {"type": "string", "enum": ["A", "B"], "nullable": true}
            }
        });
        normalize_nullable(&mut schema);
        assert_eq!(schema["properties"]["owner"], json!({"type": ["string", "null"]}));
        assert_eq!(schema["properties"]["state"]["enum"], json!(["A", "B", null]));
    }

    #[test]
    fn version_comes_from_server_or_file_name() {
        let doc = json!({"servers": [{"url": "https://{tenant}.api.identitynow.com/beta"}]});
        assert_eq!(infer_version(&doc, Path::new("whatever.json")), "beta");
        assert_eq!(infer_version(&json!({}), Path::new("sailpoint-api.v2024.yaml")), "v2024");
        assert_eq!(infer_version(&json!({}), Path::new("custom.json")), "custom");
    }
}
