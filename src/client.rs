// Async HTTP client for Specter
// Uses reqwest and tokio; every call goes through the shared retry policy

use crate::auth::AuthStrategy;
use crate::error::HttpError;
use crate::models::Method;
use crate::retry::{run_with_retry, HasStatus, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// A request relative to a client's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub content_type: &'static str,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            content_type: JSON_CONTENT_TYPE,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }
}

/// A decoded response. An empty body decodes to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub method: Method,
    pub url: String,
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into a structured error.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            Ok(self)
        } else {
            let body_preview: String = self.body.to_string().chars().take(512).collect();
            Err(HttpError::Status {
                method: self.method,
                url: self.url,
                status: self.status,
                body_preview,
            })
        }
    }
}

impl HasStatus for ApiResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

/// The HTTP collaborator every validator talks to.
///
/// `execute` returns `Ok` for every status the backend answers with; the
/// convenience methods turn non-2xx answers into [`HttpError::Status`].
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, HttpError>;

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ApiResponse, HttpError> {
        let mut request = ApiRequest::get(path);
        for (key, value) in query {
            request = request.query(*key, value.clone());
        }
        self.execute(request).await?.error_for_status()
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, HttpError> {
        self.execute(request).await?.error_for_status()
    }
}

/// reqwest-backed client bound to one base URL and one credential.
pub struct HttpApiClient {
    pub client: Client,
    base_url: String,
    auth: Option<Arc<dyn AuthStrategy>>,
    retry: RetryPolicy,
}

impl HttpApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: None,
            retry,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthStrategy>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn attempt(&self, request: &ApiRequest, url: &str) -> Result<ApiResponse, HttpError> {
        let mut req = self.client.request(request.method.to_reqwest(), url);
        if let Some(auth) = &self.auth {
            req = auth.apply_auth(req);
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, request.content_type)
                .body(body.to_string());
        }

        let resp = req.send().await.map_err(|source| HttpError::Transport {
            method: request.method,
            url: url.to_string(),
            source,
        })?;
        read_response(request.method, url, resp).await
    }
}

/// Read a reqwest response into an [`ApiResponse`].
pub(crate) async fn read_response(
    method: Method,
    url: &str,
    resp: reqwest::Response,
) -> Result<ApiResponse, HttpError> {
    let status = resp.status().as_u16();
    let text = resp.text().await.map_err(|source| HttpError::Transport {
        method,
        url: url.to_string(),
        source,
    })?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            // Error pages are rarely JSON; keep the text so the status survives.
            Err(_) if !(200..300).contains(&status) => Value::String(text),
            Err(source) => {
                return Err(HttpError::Decode {
                    method,
                    url: url.to_string(),
                    source,
                })
            }
        }
    };
    Ok(ApiResponse {
        method,
        url: url.to_string(),
        status,
        body,
    })
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, HttpError> {
        let url = self.url_for(&request.path);
        let label = format!("{} {}", request.method, url);
        run_with_retry(&self.retry, &label, || self.attempt(&request, &url)).await
    }
}

/// Build the shared reqwest client. The timeout applies per attempt.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .timeout(timeout)
        .build()
}

/// One client per API version, looked up by version name.
#[derive(Clone, Default)]
pub struct VersionedClients {
    clients: HashMap<String, Arc<dyn ApiClient>>,
}

impl VersionedClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version: impl Into<String>, client: Arc<dyn ApiClient>) {
        self.clients.insert(version.into(), client);
    }

    pub fn get(&self, version: &str) -> Option<Arc<dyn ApiClient>> {
        self.clients.get(version).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_for_status_keeps_request_descriptor() {
        let resp = ApiResponse {
            method: Method::GET,
            url: "https://tenant.example.com/v3/accounts".to_string(),
            status: 403,
            body: json!({"detailCode": "403 Forbidden"}),
        };
        let err = resp.error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("GET https://tenant.example.com/v3/accounts"));
    }

    #[test]
    fn request_builder_collects_query_and_body() {
        let req = ApiRequest::get("/accounts")
            .query("filters", "name eq \"a\"")
            .json(json!({"a": 1}))
            .content_type(JSON_PATCH_CONTENT_TYPE);
        assert_eq!(req.query, vec![("filters".to_string(), "name eq \"a\"".to_string())]);
        assert_eq!(req.body, Some(json!({"a": 1})));
        assert_eq!(req.content_type, JSON_PATCH_CONTENT_TYPE);
    }

    #[test]
    fn urls_join_base_and_path() {
        let client = HttpApiClient::new(
            Client::new(),
            "https://tenant.example.com/v3/",
            RetryPolicy::default(),
        );
        assert_eq!(client.url_for("/accounts"), "https://tenant.example.com/v3/accounts");
        assert_eq!(client.url_for("https://other/x"), "https://other/x");
    }
}
