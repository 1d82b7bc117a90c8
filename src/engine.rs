// Conformance engine for Specter
// Resolves every documented path, runs the enabled validators against it and
// folds the reports into one result per endpoint.

use crate::aggregate::{merge, AggregateMap};
use crate::auth::{BearerTokenAuth, ClientCredentials, TokenBroker, TokenSource};
use crate::client::{build_http_client, ApiClient, HttpApiClient, VersionedClients};
use crate::config::{CredentialStore, EngineConfig};
use crate::error::{ResolveError, SetupError};
use crate::models::{versioned_endpoint, EndpointStatus, ErrorEntry, Method, ValidationReport};
use crate::parameters::substitution::has_template_params;
use crate::parameters::PathResolver;
use crate::spec::{Operation, SpecDocument, SpecSet};
use crate::validators::{
    validate_create, validate_filters, validate_schema, validate_sorters, validate_user_levels,
    BrokeredExecutor, EndpointTarget, LevelExecutor,
};
use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ConformanceEngine {
    specs: Arc<SpecSet>,
    clients: VersionedClients,
    executors: HashMap<String, Arc<dyn LevelExecutor>>,
    resolver: PathResolver,
    config: EngineConfig,
}

impl ConformanceEngine {
    pub fn new(specs: Arc<SpecSet>, clients: VersionedClients, config: EngineConfig) -> Self {
        let resolver = PathResolver::new(specs.clone(), clients.clone(), config.max_resolve_iterations)
            .with_max_candidates(config.max_resolve_candidates);
        Self {
            specs,
            clients,
            executors: HashMap::new(),
            resolver,
            config,
        }
    }

    /// Executor used by the authorization matrix for `version`.
    pub fn with_level_executor(mut self, version: impl Into<String>, executor: Arc<dyn LevelExecutor>) -> Self {
        self.executors.insert(version.into(), executor);
        self
    }

    /// Wire up live clients for every loaded version.
    ///
    /// The default identity's token is acquired first; privilege-level
    /// tokens are pre-warmed concurrently when the authorization matrix is
    /// enabled. A level whose token cannot be acquired is only logged.
    pub async fn connect(
        specs: Arc<SpecSet>,
        config: EngineConfig,
        credentials: CredentialStore,
        source: Arc<dyn TokenSource>,
    ) -> Result<Self, SetupError> {
        let default = credentials
            .default
            .clone()
            .ok_or(SetupError::MissingCredentials)?;
        let http = build_http_client(config.request_timeout)?;
        let broker = Arc::new(TokenBroker::new(source));
        let token = broker.get_access_token(&default).await?;
        let auth = Arc::new(BearerTokenAuth { token });

        if config.validators.user_levels {
            let identities: Vec<ClientCredentials> =
                credentials.levels().map(|(_, c)| c.clone()).collect();
            tracing::info!(count = identities.len(), "pre-warming user level tokens");
            for (identity, outcome) in identities.iter().zip(broker.prewarm(&identities).await) {
                if let Err(err) = outcome {
                    tracing::warn!(client_id = %identity.client_id, error = %err, "token pre-warm failed");
                }
            }
        }

        let credentials = Arc::new(credentials);
        let mut clients = VersionedClients::new();
        let mut executors: Vec<(String, Arc<dyn LevelExecutor>)> = Vec::new();
        for document in specs.documents() {
            let base_url = base_url_for(document, &config);
            tracing::debug!(version = %document.version, base_url = %base_url, "api client");
            let client = HttpApiClient::new(http.clone(), base_url.clone(), config.retry.clone())
                .with_auth(auth.clone());
            clients.insert(document.version.clone(), Arc::new(client));
            executors.push((
                document.version.clone(),
                Arc::new(BrokeredExecutor::new(
                    broker.clone(),
                    credentials.clone(),
                    http.clone(),
                    base_url,
                    config.retry.clone(),
                )),
            ));
        }

        let mut engine = Self::new(specs, clients, config);
        for (version, executor) in executors {
            engine = engine.with_level_executor(version, executor);
        }
        Ok(engine)
    }

    /// Validate every path of every version, or only those matching
    /// `only_path` (a templated path, with or without its version prefix).
    pub async fn run(&self, only_path: Option<&str>) -> AggregateMap {
        let units: Vec<(&str, &str)> = self
            .specs
            .documents()
            .flat_map(|document| {
                document
                    .paths()
                    .into_iter()
                    .map(move |path| (document.version.as_str(), path))
            })
            .filter(|(version, path)| match only_path {
                Some(wanted) => *path == wanted || versioned_endpoint(version, path) == wanted,
                None => true,
            })
            .collect();
        tracing::info!(paths = units.len(), "validating paths");

        let reports: Vec<Vec<ValidationReport>> = stream::iter(units)
            .map(|(version, path)| self.validate_path(version, path))
            .buffer_unordered(self.config.max_concurrent_endpoints.max(1))
            .collect()
            .await;
        merge(reports.into_iter().flatten())
    }

    /// Every report for the operations under one path.
    pub async fn validate_path(&self, version: &str, path: &str) -> Vec<ValidationReport> {
        let Some(document) = self.specs.get(version) else {
            return Vec::new();
        };
        let operations = document.operations_at(path);
        if operations.is_empty() {
            return Vec::new();
        }

        let Some(client) = self.clients.get(version) else {
            tracing::warn!(version, path, "no API client for version");
            return flag_all(&operations, EndpointStatus::ApiError);
        };

        let concrete_path = if has_template_params(path) {
            match self.resolver.resolve(version, path).await {
                Ok(concrete) => concrete,
                Err(err) => return unresolved(&operations, version, path, &err),
            }
        } else {
            path.to_string()
        };

        let targets: Vec<EndpointTarget<'_>> = operations
            .into_iter()
            .map(|operation| EndpointTarget::new(operation, concrete_path.clone()))
            .collect();
        let executor = self.executors.get(version).cloned();
        join_all(self.validations(client.as_ref(), executor.as_deref(), &targets, path)).await
    }

    fn validations<'f>(
        &'f self,
        client: &'f dyn ApiClient,
        executor: Option<&'f dyn LevelExecutor>,
        targets: &'f [EndpointTarget<'f>],
        path: &str,
    ) -> Vec<BoxFuture<'f, ValidationReport>> {
        let toggles = self.config.validators;
        let mut tasks = Vec::new();
        for target in targets {
            match target.operation.method {
                Method::GET => {
                    if toggles.schema {
                        tasks.push(validate_schema(client, target).boxed());
                    }
                    if toggles.filters {
                        tasks.push(validate_filters(client, target, self.config.forbid_contains).boxed());
                    }
                    if toggles.sorters {
                        tasks.push(validate_sorters(client, target).boxed());
                    }
                }
                Method::POST if toggles.create && !has_template_params(path) => {
                    tasks.push(validate_create(client, target).boxed());
                }
                _ => {}
            }
            if let (true, Some(executor)) = (toggles.user_levels, executor) {
                let documented = target.operation.user_levels().unwrap_or_default();
                tasks.push(
                    async move { validate_user_levels(executor, target, &documented).await }.boxed(),
                );
            }
        }
        tasks
    }
}

fn base_url_for(document: &SpecDocument, config: &EngineConfig) -> String {
    document
        .server_url(&config.tenant)
        .unwrap_or_else(|| config.version_base_url(&document.version))
}

/// Reports for a path that could not be made concrete. A cycle or a runaway
/// resolution is a defect in the description and is reported as an entry;
/// missing data only raises the flag.
fn unresolved(operations: &[Operation<'_>], version: &str, path: &str, err: &ResolveError) -> Vec<ValidationReport> {
    let mut reports = flag_all(operations, EndpointStatus::PathParamUnresolved);
    match err {
        ResolveError::Unresolved { .. } => {
            tracing::info!(version, path, error = %err, "skipping path");
        }
        ResolveError::Cyclic { .. } | ResolveError::IterationLimit { .. } => {
            tracing::warn!(version, path, error = %err, "path parameters cannot be resolved");
            for report in &mut reports {
                report.insert_entry("Path resolution", ErrorEntry::new(err.to_string()));
            }
        }
    }
    reports
}

fn flag_all(operations: &[Operation<'_>], status: EndpointStatus) -> Vec<ValidationReport> {
    operations
        .iter()
        .map(|operation| {
            let mut report = ValidationReport::new(
                operation.method,
                versioned_endpoint(operation.version, operation.path),
                operation.tag(),
            );
            report.flag(status);
            report
        })
        .collect()
}
