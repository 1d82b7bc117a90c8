// Path parameter resolution against live data
//
// A templated path is made concrete one `{param}` at a time, leftmost first.
// Enum parameters are probed value by value. Other parameters are harvested
// from the collection that produces them, found through the
// `x-sailpoint-resource-operation-id` extension or the path prefix.

use crate::client::{ApiClient, VersionedClients};
use crate::error::ResolveError;
use crate::models::Method;
use crate::parameters::substitution::{
    collection_prefix, find_value_by_key, first_template_param, has_template_params,
    replace_param, truncate_after_segment, TemplateParam,
};
use crate::response_analysis::{has_records, is_non_empty, records};
use crate::spec::{Parameter, SpecSet, VERSION_PRIORITY};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

/// Records probed per parameter before giving up.
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

pub struct PathResolver {
    specs: Arc<SpecSet>,
    clients: VersionedClients,
    max_iterations: usize,
    max_candidates: usize,
}

impl PathResolver {
    pub fn new(specs: Arc<SpecSet>, clients: VersionedClients, max_iterations: usize) -> Self {
        Self {
            specs,
            clients,
            max_iterations,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Turn `path` (a key of the `version` document) into a concrete path.
    pub async fn resolve(&self, version: &str, path: &str) -> Result<String, ResolveError> {
        self.resolve_inner(version.to_string(), path.to_string(), Vec::new())
            .await
    }

    fn resolve_inner(
        &self,
        version: String,
        path: String,
        chain: Vec<(String, String)>,
    ) -> BoxFuture<'_, Result<String, ResolveError>> {
        async move {
            let key = (version.clone(), path.clone());
            if chain.contains(&key) {
                return Err(ResolveError::Cyclic { path });
            }
            let mut chain = chain;
            chain.push(key);

            let mut resolved = path.clone();
            let mut iterations = 0usize;

            while let Some(param) = first_template_param(&resolved) {
                iterations += 1;
                if iterations > self.max_iterations {
                    return Err(ResolveError::IterationLimit {
                        path,
                        limit: self.max_iterations,
                    });
                }

                let spec_param = self.parameter_spec(&version, &path, &param.name);
                let value = match spec_param.and_then(|p| p.enum_values()) {
                    Some(values) => self.probe_enum(&version, &resolved, &param, &values).await,
                    None => {
                        self.harvest(&version, &path, &resolved, &param, spec_param, &chain)
                            .await?
                    }
                };

                match value {
                    Some(value) => {
                        tracing::debug!(path = %path, param = %param.name, value = %value, "resolved path parameter");
                        resolved = replace_param(&resolved, &param, &value);
                    }
                    None => {
                        return Err(ResolveError::Unresolved {
                            path,
                            param: param.name,
                        })
                    }
                }
            }

            Ok(resolved)
        }
        .boxed()
    }

    /// Parameter declaration, preferring the GET operation of the path.
    fn parameter_spec(&self, version: &str, path: &str, name: &str) -> Option<Parameter<'_>> {
        let document = self.specs.get(version)?;
        if let Some(p) = document
            .operation(path, Method::GET)
            .and_then(|op| op.parameter(name))
        {
            return Some(p);
        }
        document
            .operations_at(path)
            .into_iter()
            .find_map(|op| op.parameter(name))
    }

    /// Client for `version`, else the first available by version priority.
    fn client_for(&self, version: &str) -> Option<Arc<dyn ApiClient>> {
        self.clients.get(version).or_else(|| {
            VERSION_PRIORITY
                .iter()
                .find_map(|v| self.clients.get(v))
        })
    }

    /// GET that treats every failure as "no data".
    async fn fetch(&self, version: &str, path: &str) -> Option<Value> {
        let client = self.client_for(version)?;
        match client.get(path, &[]).await {
            Ok(response) => Some(response.body),
            Err(err) => {
                tracing::debug!(path, error = %err, "probe failed");
                None
            }
        }
    }

    async fn probe_enum(
        &self,
        version: &str,
        resolved: &str,
        param: &TemplateParam,
        values: &[String],
    ) -> Option<String> {
        for value in values {
            let candidate = replace_param(resolved, param, value);
            let probe = truncate_after_segment(&candidate, param.span.start);
            match self.fetch(version, probe).await {
                Some(body) if has_records(&body) => return Some(value.clone()),
                _ => tracing::debug!(path = %probe, value = %value, "no data for enum value"),
            }
        }
        None
    }

    async fn harvest(
        &self,
        version: &str,
        path: &str,
        resolved: &str,
        param: &TemplateParam,
        spec_param: Option<Parameter<'_>>,
        chain: &[(String, String)],
    ) -> Result<Option<String>, ResolveError> {
        let (collection_version, collection_path) =
            match spec_param.and_then(|p| p.producer_operation_id()) {
                Some(operation_id) => {
                    let Some(producer) = self.specs.find_producer(operation_id, version) else {
                        tracing::debug!(path, operation_id, "producing operation not found");
                        return Ok(None);
                    };
                    if producer.path == path {
                        return Err(ResolveError::Cyclic {
                            path: path.to_string(),
                        });
                    }
                    let concrete = if has_template_params(&producer.path) {
                        self.resolve_inner(
                            producer.version.clone(),
                            producer.path.clone(),
                            chain.to_vec(),
                        )
                        .await?
                    } else {
                        producer.path.clone()
                    };
                    (producer.version, concrete)
                }
                None => (version.to_string(), collection_prefix(resolved, param)),
            };

        let Some(body) = self.fetch(&collection_version, &collection_path).await else {
            return Ok(None);
        };
        let candidates = records(&body);
        if candidates.is_empty() {
            tracing::debug!(path = %collection_path, "no data in producing collection");
            return Ok(None);
        }

        let mut probed = 0usize;
        for record in candidates {
            let Some(value) = find_value_by_key(record, &param.name) else {
                continue;
            };
            let candidate = replace_param(resolved, param, &value);
            // Later parameters still need the collection below this one.
            if has_template_params(&candidate) {
                return Ok(Some(value));
            }
            if probed >= self.max_candidates {
                break;
            }
            probed += 1;
            if let Some(body) = self.fetch(version, &candidate).await {
                if is_non_empty(&body) {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }
}
