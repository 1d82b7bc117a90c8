/// Loader tests for OpenAPI descriptions
/// Covers $ref containment, YAML input and directory discovery
use serde_json::json;
use specter::models::Method;
use specter::parsers::{OpenApiLoader, SpecSource};
use specter::SpecError;
use std::fs;
use std::path::PathBuf;

/// Fresh scratch directory per test.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("specter_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn widgets_doc(schema_ref: &str) -> String {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Test", "version": "1.0.0"},
        "paths": {"/widgets": {"get": {"responses": {"200": {"content": {
            "application/json": {"schema": {"$ref": schema_ref}}
        }}}}}}
    })
    .to_string()
}

#[test]
fn test_ref_outside_description_directory_is_rejected() {
    let dir = scratch("traversal");
    let nested = dir.join("specs");
    fs::create_dir_all(&nested).unwrap();
    fs::write(dir.join("secret.json"), r#"{"Widget": {"type": "string"}}"#).unwrap();
    let file = nested.join("v3.json");
    fs::write(&file, widgets_doc("../secret.json#/Widget")).unwrap();

    let document = OpenApiLoader::load_file(&file).expect("description still loads");
    let op = document.operation("/widgets", Method::GET).unwrap();
    assert_eq!(op.response_schema(&["200"]), Some(&json!({})));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_sibling_file_ref_is_inlined() {
    let dir = scratch("sibling");
    fs::write(
        dir.join("schemas.json"),
        r#"{"Widget": {"type": "object", "properties": {"id": {"type": "string", "nullable": true}}}}"#,
    )
    .unwrap();
    let file = dir.join("v3.json");
    fs::write(&file, widgets_doc("schemas.json#/Widget")).unwrap();

    let document = OpenApiLoader::load_file(&file).unwrap();
    assert_eq!(document.version, "v3");
    let op = document.operation("/widgets", Method::GET).unwrap();
    assert_eq!(
        op.response_schema(&["200"]).unwrap()["properties"]["id"]["type"],
        json!(["string", "null"])
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_directory_loads_every_version_and_skips_fragments() {
    let dir = scratch("directory");
    fs::write(
        dir.join("sailpoint-api.beta.yaml"),
        "openapi: 3.0.0\npaths:\n  /things:\n    get:\n      tags: [Things]\n",
    )
    .unwrap();
    fs::write(
        dir.join("api.json"),
        json!({
            "servers": [{"url": "https://{tenant}.api.identitynow.com/v3"}],
            "paths": {"/accounts": {"get": {}}}
        })
        .to_string(),
    )
    .unwrap();
    fs::write(dir.join("fragment.json"), r#"{"Widget": {"type": "string"}}"#).unwrap();
    fs::write(dir.join("notes.txt"), "not a description").unwrap();

    let specs = OpenApiLoader.load(dir.to_str().unwrap()).unwrap();
    let mut versions = specs.versions();
    versions.sort();
    assert_eq!(versions, vec!["beta", "v3"]);
    assert!(specs.get("beta").unwrap().operation("/things", Method::GET).is_some());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_empty_directory_is_an_error() {
    let dir = scratch("empty");
    let result = OpenApiLoader.load(dir.to_str().unwrap());
    assert!(matches!(result, Err(SpecError::Empty(_))));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_malformed_file_reports_parse_error() {
    let dir = scratch("malformed");
    let file = dir.join("v3.json");
    fs::write(&file, "{ not json").unwrap();
    let result = OpenApiLoader::load_file(&file);
    assert!(matches!(result, Err(SpecError::Parse { .. })));
    let _ = fs::remove_dir_all(&dir);
}
