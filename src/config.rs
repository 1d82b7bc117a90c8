// Run configuration for Specter
// Tenant and endpoints, validator toggles, and where credentials come from

use crate::auth::ClientCredentials;
use crate::parameters::resolver::DEFAULT_MAX_CANDIDATES;
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use std::time::Duration;

/// Which validator categories run. Every category is independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorToggles {
    pub schema: bool,
    pub filters: bool,
    pub sorters: bool,
    pub user_levels: bool,
    /// POST-then-cleanup schema checks. Off unless asked for.
    pub create: bool,
}

impl Default for ValidatorToggles {
    fn default() -> Self {
        Self {
            schema: true,
            filters: true,
            sorters: true,
            user_levels: true,
            create: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tenant: String,
    /// Host template; `{tenant}` is substituted.
    pub host_template: String,
    /// Per-attempt request timeout. Some endpoints take ~10s to answer.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub validators: ValidatorToggles,
    /// Upper bound on parameter substitutions while resolving one path.
    pub max_resolve_iterations: usize,
    /// Records probed per path parameter before resolution gives up.
    pub max_resolve_candidates: usize,
    /// Drop `co` from every operator set.
    pub forbid_contains: bool,
    /// Endpoints validated at the same time.
    pub max_concurrent_endpoints: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            host_template: "https://{tenant}.api.identitynow.com".to_string(),
            request_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            validators: ValidatorToggles::default(),
            max_resolve_iterations: 16,
            max_resolve_candidates: DEFAULT_MAX_CANDIDATES,
            forbid_contains: false,
            max_concurrent_endpoints: 16,
        }
    }
}

impl EngineConfig {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Self::default()
        }
    }

    pub fn host(&self) -> String {
        self.host_template.replace("{tenant}", &self.tenant)
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.host().trim_end_matches('/'))
    }

    /// Base URL for a version when the description's servers list gives none.
    pub fn version_base_url(&self, version: &str) -> String {
        format!("{}/{}", self.host().trim_end_matches('/'), version)
    }
}

/// Environment variable prefix for a privilege level:
/// `sp:ui-config-hub-admin` becomes `SP_UI_CONFIG_HUB_ADMIN`.
pub fn user_level_env_prefix(level: &str) -> String {
    level.replace([':', '-'], "_").to_uppercase()
}

/// Client credentials for the default identity and each privilege level.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    pub default: Option<ClientCredentials>,
    levels: HashMap<String, ClientCredentials>,
}

impl CredentialStore {
    pub fn new(default: Option<ClientCredentials>) -> Self {
        Self {
            default,
            levels: HashMap::new(),
        }
    }

    pub fn insert_level(&mut self, level: impl Into<String>, credentials: ClientCredentials) {
        self.levels.insert(level.into(), credentials);
    }

    pub fn for_level(&self, level: &str) -> Option<&ClientCredentials> {
        self.levels.get(level)
    }

    pub fn levels(&self) -> impl Iterator<Item = (&String, &ClientCredentials)> {
        self.levels.iter()
    }

    /// Load `{PREFIX}_CLIENT_ID` / `{PREFIX}_CLIENT_SECRET` for each level
    /// through `lookup`. Levels missing either half are skipped.
    pub fn load_levels<'a, F>(&mut self, levels: impl IntoIterator<Item = &'a str>, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for level in levels {
            let prefix = user_level_env_prefix(level);
            let id = lookup(&format!("{}_CLIENT_ID", prefix));
            let secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
            match (id, secret) {
                (Some(id), Some(secret)) => {
                    self.insert_level(level, ClientCredentials::new(id, secret));
                }
                _ => tracing::debug!(user_level = level, "no credentials configured for user level"),
            }
        }
    }

    pub fn load_levels_from_env<'a>(&mut self, levels: impl IntoIterator<Item = &'a str>) {
        self.load_levels(levels, |name| std::env::var(name).ok());
    }
}
