// Authorization matrix
//
// Every known privilege level is sent the same request under its own
// identity. The answers are compared with the levels the operation documents.

use crate::auth::{BearerTokenAuth, TokenBroker};
use crate::client::{ApiClient, ApiRequest, ApiResponse, HttpApiClient};
use crate::config::CredentialStore;
use crate::error::ProbeError;
use crate::models::{Bucket, ErrorEntry, Method, ValidationReport};
use crate::parameters::substitution::{extract_path_params, substitute_params};
use crate::request_body::create_request_body;
use crate::retry::RetryPolicy;
use crate::validators::EndpointTarget;
use crate::verdict::{decide_access_verdict, AccessVerdict};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;

pub const KNOWN_USER_LEVELS: [&str; 21] = [
    "ORG_ADMIN",
    "CERT_ADMIN",
    "HELPDESK",
    "REPORT_ADMIN",
    "ROLE_ADMIN",
    "ROLE_SUBADMIN",
    "SOURCE_ADMIN",
    "SOURCE_SUBADMIN",
    "CLOUD_GOV_ADMIN",
    "CLOUD_GOV_USER",
    "SAAS_MANAGEMENT_ADMIN",
    "SAAS_MANAGEMENT_READER",
    "das:ui-administrator",
    "das:ui-compliance_manager",
    "das:ui-auditor",
    "das:ui-data-scope",
    "sp:aic-dashboard-read",
    "sp:aic-dashboard-write",
    "sp:ui-config-hub-admin",
    "sp:ui-config-hub-backup-admin",
    "sp:ui-config-hub-read",
];

/// Issues requests under the identity of a privilege level.
#[async_trait]
pub trait LevelExecutor: Send + Sync {
    /// Whether requests can be made as `level` at all.
    fn has_level(&self, level: &str) -> bool;

    /// Execute `request` as `level`. Every status the backend answers with
    /// comes back as `Ok`.
    async fn execute_as(&self, level: &str, request: ApiRequest) -> Result<ApiResponse, ProbeError>;
}

/// Level executor backed by the shared token broker.
pub struct BrokeredExecutor {
    broker: Arc<TokenBroker>,
    credentials: Arc<CredentialStore>,
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BrokeredExecutor {
    pub fn new(
        broker: Arc<TokenBroker>,
        credentials: Arc<CredentialStore>,
        http: Client,
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            credentials,
            http,
            base_url: base_url.into(),
            retry,
        }
    }
}

#[async_trait]
impl LevelExecutor for BrokeredExecutor {
    fn has_level(&self, level: &str) -> bool {
        self.credentials.for_level(level).is_some()
    }

    async fn execute_as(&self, level: &str, request: ApiRequest) -> Result<ApiResponse, ProbeError> {
        let credentials = self
            .credentials
            .for_level(level)
            .ok_or_else(|| ProbeError::NoCredentials(level.to_string()))?;
        let token = self.broker.get_access_token(credentials).await?;
        let client = HttpApiClient::new(self.http.clone(), self.base_url.clone(), self.retry.clone())
            .with_auth(Arc::new(BearerTokenAuth { token }));
        Ok(client.execute(request).await?)
    }
}

fn undocumented_message(level: &str) -> String {
    format!(
        "This endpoint supports the user level `{}` but it is not documented in `x-sailpoint-userLevels`.",
        level
    )
}

fn unsupported_message(level: &str) -> String {
    format!(
        "This endpoint says it supports the user level `{}` but attempting to use this user level results in a 403 forbidden. If this endpoint supports record level authorization, this may be a false positive. Please manually verify.",
        level
    )
}

/// Probe every known level against one operation at its concrete path.
///
/// DELETE operations are never probed. Levels without configured
/// credentials are skipped.
pub async fn validate_user_levels(
    executor: &dyn LevelExecutor,
    target: &EndpointTarget<'_>,
    documented: &[String],
) -> ValidationReport {
    let mut report = target.report_with_buckets([
        Bucket::UndocumentedUserLevels,
        Bucket::UnsupportedUserLevels,
    ]);
    if target.operation.method == Method::DELETE {
        return report;
    }

    let mut request = ApiRequest::new(target.operation.method, target.concrete_path.clone());
    if let Some((content_type, mut body)) = create_request_body(&target.operation) {
        // Body fields named like path parameters carry the resolved ids.
        let ids = extract_path_params(target.operation.path, &target.concrete_path);
        substitute_params(&mut body, &ids);
        request = request.json(body).content_type(content_type);
    }

    let levels: Vec<&str> = KNOWN_USER_LEVELS
        .iter()
        .copied()
        .filter(|level| {
            let available = executor.has_level(level);
            if !available {
                tracing::debug!(user_level = *level, "skipping user level without credentials");
            }
            available
        })
        .collect();

    let probes = levels.into_iter().map(|level| {
        let request = request.clone();
        async move { (level, executor.execute_as(level, request).await) }
    });
    let outcomes = join_all(probes).await;

    let label = format!("{} {}", request.method, request.path);
    for (level, outcome) in outcomes {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(user_level = level, request = %label, error = %err, "user level probe failed");
                continue;
            }
        };
        let is_documented = documented.iter().any(|d| d == level);
        match decide_access_verdict(response.status, is_documented) {
            AccessVerdict::Undocumented => {
                report.push_to_bucket(Bucket::UndocumentedUserLevels, ErrorEntry::new(undocumented_message(level)))
            }
            AccessVerdict::Unsupported => {
                report.push_to_bucket(Bucket::UnsupportedUserLevels, ErrorEntry::new(unsupported_message(level)))
            }
            AccessVerdict::Consistent => {}
            AccessVerdict::Inconclusive => tracing::warn!(
                user_level = level,
                status = response.status,
                request = %label,
                response = %response.body,
                "Unable to test user level `{}` because the provided inputs resulted in a {}.",
                level,
                response.status
            ),
        }
    }
    report
}
