pub mod aggregate;
pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod parameters;
pub mod parsers;
pub mod reporting;
pub mod request_body;
pub mod response_analysis;
pub mod retry;
pub mod spec;
pub mod validators;
pub mod verdict;

// Re-export commonly used items
pub use aggregate::{merge, merge_into, AggregateMap};
pub use auth::{ClientCredentials, OAuthTokenSource, TokenBroker, TokenSource};
pub use client::{ApiClient, ApiRequest, ApiResponse, HttpApiClient, VersionedClients};
pub use config::{CredentialStore, EngineConfig, ValidatorToggles};
pub use engine::ConformanceEngine;
pub use error::{DescriptionError, HttpError, ProbeError, ResolveError, SetupError, SpecError, TokenError};
pub use models::*;
pub use parameters::PathResolver;
pub use parsers::{OpenApiLoader, SpecSource};
pub use reporting::{exit_code, CoverageSummary};
pub use retry::RetryPolicy;
pub use spec::{Operation, SpecDocument, SpecSet};
pub use validators::{EndpointTarget, LevelExecutor, KNOWN_USER_LEVELS};
