// Error types for Specter
//
// Transport, credential, spec and resolution failures each get their own enum.
// None of them escape a batch: validators fold them into endpoint results.

use crate::models::Method;
use thiserror::Error;

/// Failure of an outbound API call.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The backend answered with a non-success status.
    #[error("{method} {url} returned HTTP {status}: {body_preview}")]
    Status {
        method: Method,
        url: String,
        status: u16,
        body_preview: String,
    },

    /// No response was received (DNS, connect, reset, timeout).
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not valid JSON.
    #[error("{method} {url} returned a body that is not JSON: {source}")]
    Decode {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HttpError {
    /// HTTP status carried by the error, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport { .. })
    }
}

/// Failure acquiring a bearer credential.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token request for client {client_id} failed: {source}")]
    Exchange {
        client_id: String,
        #[source]
        source: HttpError,
    },

    #[error("token response for client {0} has no access_token")]
    MalformedResponse(String),
}

/// Failure loading or reading an API description.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("no API descriptions found under {0}")]
    Empty(String),
}

/// Malformed human-readable filter or sorter documentation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptionError {
    #[error("line {line} has no property name: {text:?}")]
    MissingProperty { line: usize, text: String },

    #[error("property `{property}` lists no operators")]
    MissingOperators { property: String },

    #[error("property `{property}` lists unknown operator `{token}`")]
    UnknownOperator { property: String, token: String },

    #[error("sorter documentation appears {0} times; expected at most once")]
    DuplicateSorterLine(usize),
}

/// Outcome of a path parameter resolution that did not yield a concrete path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("path parameter {{{param}}} in {path} could not be resolved")]
    Unresolved { path: String, param: String },

    #[error("circular producer reference detected for {path}")]
    Cyclic { path: String },

    #[error("gave up resolving {path} after {limit} iterations")]
    IterationLimit { path: String, limit: usize },
}

/// Failure of a request issued under a privilege level's identity.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("no credentials configured for user level {0}")]
    NoCredentials(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Failure before any endpoint is validated. Fatal for a run.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("no default client credentials configured (CLIENT_ID / CLIENT_SECRET)")]
    MissingCredentials,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Spec(#[from] SpecError),
}
