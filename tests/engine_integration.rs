/// End-to-end runs of the conformance engine against a mock tenant
use httpmock::prelude::*;
use serde_json::json;
use specter::auth::{ClientCredentials, OAuthTokenSource};
use specter::client::build_http_client;
use specter::config::{CredentialStore, EngineConfig, ValidatorToggles};
use specter::engine::ConformanceEngine;
use specter::models::EndpointStatus;
use specter::reporting::{exit_code, CoverageSummary};
use specter::{RetryPolicy, SetupError, SpecDocument, SpecSet};
use std::sync::Arc;
use std::time::Duration;

fn specs() -> Arc<SpecSet> {
    let mut set = SpecSet::new();
    set.insert(SpecDocument::new(
        "v3",
        json!({"paths": {
            "/widgets": {"get": {
                "tags": ["Widgets"],
                "x-sailpoint-userLevels": ["ORG_ADMIN"],
                "responses": {"200": {"content": {"application/json": {"schema": {
                    "type": "array",
                    "items": {"type": "object", "properties": {
                        "id": {"type": "string"},
                        "name": {"type": "string"}
                    }}
                }}}}}
            }},
            "/widgets/{id}": {"get": {
                "x-sailpoint-userLevels": ["ORG_ADMIN", "HELPDESK"],
                "responses": {"200": {"content": {"application/json": {"schema": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "name": {"type": "string"}}
                }}}}}
            }}
        }}),
    ));
    Arc::new(set)
}

fn config(server: &MockServer) -> EngineConfig {
    let mut config = EngineConfig::new("acme");
    config.host_template = server.base_url();
    config.retry = RetryPolicy {
        backoff_step: Duration::from_millis(1),
        max_retries: 3,
        ..RetryPolicy::default()
    };
    config.validators = ValidatorToggles {
        schema: true,
        filters: false,
        sorters: false,
        user_levels: true,
        create: false,
    };
    config
}

fn token_source(server: &MockServer) -> Arc<OAuthTokenSource> {
    Arc::new(OAuthTokenSource::new(
        build_http_client(Duration::from_secs(5)).unwrap(),
        server.url("/oauth/token"),
        RetryPolicy::default(),
    ))
}

fn mock_token<'a>(server: &'a MockServer, client_id: &str, token: &str) -> httpmock::Mock<'a> {
    let body = json!({"access_token": token}).to_string();
    let client_id = client_id.to_string();
    server.mock(move |when, then| {
        when.method(POST)
            .path("/oauth/token")
            .query_param("client_id", client_id);
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    })
}

#[tokio::test]
async fn test_full_run_reports_schema_and_user_level_findings() {
    let server = MockServer::start();
    let admin_token = mock_token(&server, "admin", "admin-token");
    let helpdesk_token = mock_token(&server, "helpdesk", "helpdesk-token");
    server.mock(|when, then| {
        when.method(GET).path("/v3/widgets");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"[{"id": "w1", "name": "first", "colour": "red"}]"#);
    });
    server.mock(|when, then| {
        when.method(GET).path("/v3/widgets/w1");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id": "w1", "name": "first"}"#);
    });

    let mut credentials = CredentialStore::new(Some(ClientCredentials::new("admin", "a")));
    credentials.insert_level("HELPDESK", ClientCredentials::new("helpdesk", "h"));

    let engine = ConformanceEngine::connect(specs(), config(&server), credentials, token_source(&server))
        .await
        .expect("engine connects");
    let results = engine.run(None).await;

    let widgets = &results["GET /v3/widgets"];
    assert!(widgets.schema_errors.contains_key("colour"));
    assert_eq!(widgets.undocumented_user_levels.len(), 1);
    assert!(widgets.undocumented_user_levels[0].message.contains("`HELPDESK`"));
    assert!(widgets.status.contains(&EndpointStatus::AdditionalProperties));
    assert!(widgets.status.contains(&EndpointStatus::UndocumentedUserLevels));

    let widget = &results["GET /v3/widgets/{id}"];
    assert!(!widget.has_errors(), "unexpected findings: {:?}", widget);

    assert_eq!(exit_code(&results), 1);
    let summary = CoverageSummary::from_results(&results);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.passing, 1);

    admin_token.assert_calls(1);
    helpdesk_token.assert_calls(1);
}

#[tokio::test]
async fn test_unresolvable_path_is_flagged_not_fatal() {
    let server = MockServer::start();
    mock_token(&server, "admin", "admin-token");
    server.mock(|when, then| {
        when.method(GET).path("/v3/widgets");
        then.status(200)
            .header("content-type", "application/json")
            .body("[]");
    });

    let engine = ConformanceEngine::connect(
        specs(),
        config(&server),
        CredentialStore::new(Some(ClientCredentials::new("admin", "a"))),
        token_source(&server),
    )
    .await
    .unwrap();
    let results = engine.run(None).await;

    assert_eq!(results["GET /v3/widgets"].status, vec![EndpointStatus::NoData]);
    assert_eq!(
        results["GET /v3/widgets/{id}"].status,
        vec![EndpointStatus::PathParamUnresolved]
    );
    assert_eq!(exit_code(&results), 0);
}

#[tokio::test]
async fn test_missing_default_credentials_fail_setup() {
    let server = MockServer::start();
    let result = ConformanceEngine::connect(
        specs(),
        config(&server),
        CredentialStore::default(),
        token_source(&server),
    )
    .await;
    assert!(matches!(result, Err(SetupError::MissingCredentials)));
}
