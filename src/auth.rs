// Authentication for Specter
// Bearer credentials per identity, acquired through OAuth client credentials
// and cached process-wide with at most one exchange in flight per identity.

use crate::client::read_response;
use crate::error::{HttpError, TokenError};
use crate::models::Method;
use crate::retry::{run_with_retry, RetryPolicy};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub trait AuthStrategy: Send + Sync {
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder;
}

pub struct BearerTokenAuth {
    pub token: String,
}

impl AuthStrategy for BearerTokenAuth {
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.token)
    }
}

/// OAuth client-credentials pair. The client id is the cache identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// The credential collaborator: exchanges a client id/secret for a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self, credentials: &ClientCredentials) -> Result<String, TokenError>;
}

/// Client-credentials exchange against the tenant's fixed token endpoint.
pub struct OAuthTokenSource {
    client: Client,
    token_url: String,
    retry: RetryPolicy,
}

impl OAuthTokenSource {
    pub fn new(client: Client, token_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            retry,
        }
    }

    async fn exchange(&self, credentials: &ClientCredentials) -> Result<Value, HttpError> {
        let label = format!("token {}", credentials.client_id);
        let response = run_with_retry(&self.retry, &label, || async {
            let resp = self
                .client
                .post(&self.token_url)
                .query(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", credentials.client_id.as_str()),
                    ("client_secret", credentials.client_secret.as_str()),
                ])
                .send()
                .await
                .map_err(|source| HttpError::Transport {
                    method: Method::POST,
                    url: self.token_url.clone(),
                    source,
                })?;
            read_response(Method::POST, &self.token_url, resp).await
        })
        .await?
        .error_for_status()?;
        Ok(response.body)
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn fetch_token(&self, credentials: &ClientCredentials) -> Result<String, TokenError> {
        let body = self
            .exchange(credentials)
            .await
            .map_err(|source| TokenError::Exchange {
                client_id: credentials.client_id.clone(),
                source,
            })?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TokenError::MalformedResponse(credentials.client_id.clone()))
    }
}

/// Get-or-create cache that coalesces concurrent first requests for a key.
///
/// A failed initialisation leaves the slot empty so a later caller retries.
pub struct CoalescingCache<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for CoalescingCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_create<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        slot.get_or_try_init(init).await.cloned()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().await;
        slots.get(key).and_then(|slot| slot.get().cloned())
    }
}

/// Process-wide bearer token cache keyed by client id.
///
/// Tokens live until process exit; there is no invalidation.
pub struct TokenBroker {
    source: Arc<dyn TokenSource>,
    cache: CoalescingCache<String, String>,
}

impl TokenBroker {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cache: CoalescingCache::new(),
        }
    }

    pub async fn get_access_token(&self, credentials: &ClientCredentials) -> Result<String, TokenError> {
        self.cache
            .get_or_try_create(&credentials.client_id, || async {
                let token = self.source.fetch_token(credentials).await?;
                match token_expiry(&token) {
                    Some(expiry) => tracing::info!(
                        client_id = %credentials.client_id,
                        expires_at = %expiry.to_rfc3339(),
                        "acquired access token"
                    ),
                    None => tracing::info!(client_id = %credentials.client_id, "acquired access token"),
                }
                Ok(token)
            })
            .await
    }

    /// Acquire tokens for every identity up front, concurrently.
    pub async fn prewarm(&self, identities: &[ClientCredentials]) -> Vec<Result<String, TokenError>> {
        futures::future::join_all(identities.iter().map(|c| self.get_access_token(c))).await
    }
}

/// Read the `exp` claim from a JWT without verifying it.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    // JWT uses base64url encoding without padding
    let decoded = general_purpose::URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let json: Value = serde_json::from_slice(&decoded).ok()?;
    let exp = json.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self, credentials: &ClientCredentials) -> Result<String, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(format!("token-for-{}", credentials.client_id))
        }
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_exchange() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let broker = TokenBroker::new(source.clone());
        let creds = ClientCredentials::new("helpdesk", "secret");

        let tokens = broker
            .prewarm(&[creds.clone(), creds.clone(), creds.clone()])
            .await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        for token in tokens {
            assert_eq!(token.unwrap(), "token-for-helpdesk");
        }
    }

    #[tokio::test]
    async fn distinct_identities_get_distinct_tokens() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let broker = TokenBroker::new(source.clone());

        let admin = broker
            .get_access_token(&ClientCredentials::new("admin", "a"))
            .await
            .unwrap();
        let helpdesk = broker
            .get_access_token(&ClientCredentials::new("helpdesk", "h"))
            .await
            .unwrap();

        assert_ne!(admin, helpdesk);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_creation_is_retried_by_next_caller() {
        let cache: CoalescingCache<String, String> = CoalescingCache::new();
        let key = "id".to_string();

        let first: Result<String, &str> = cache.get_or_try_create(&key, || async { Err("boom") }).await;
        assert!(first.is_err());
        assert_eq!(cache.get(&key).await, None);

        let second: Result<String, &str> = cache
            .get_or_try_create(&key, || async { Ok("value".to_string()) })
            .await;
        assert_eq!(second.unwrap(), "value");
    }

    #[test]
    fn token_expiry_reads_exp_claim() {
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"exp\":1700000000}");
        let token = format!("aaa.{}.ccc", payload);
        let expiry = token_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_700_000_000);
        assert_eq!(token_expiry("not-a-jwt"), None);
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = ClientCredentials::new("id", "super-secret");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("super-secret"));
    }
}
