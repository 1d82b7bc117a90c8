// Core data models for Specter
// Endpoint identity, error buckets and the per-endpoint aggregate

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
}

impl Method {
    /// Parse the lowercase method key used under an OpenAPI path item.
    pub fn from_spec_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "get" => Some(Method::GET),
            "post" => Some(Method::POST),
            "put" => Some(Method::PUT),
            "delete" => Some(Method::DELETE),
            "patch" => Some(Method::PATCH),
            "options" => Some(Method::OPTIONS),
            "head" => Some(Method::HEAD),
            _ => None,
        }
    }

    pub fn spec_key(&self) -> &'static str {
        match self {
            Method::GET => "get",
            Method::POST => "post",
            Method::PUT => "put",
            Method::DELETE => "delete",
            Method::PATCH => "patch",
            Method::OPTIONS => "options",
            Method::HEAD => "head",
        }
    }

    /// Methods whose requests carry a JSON body.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::DELETE => reqwest::Method::DELETE,
            Method::PATCH => reqwest::Method::PATCH,
            Method::OPTIONS => reqwest::Method::OPTIONS,
            Method::HEAD => reqwest::Method::HEAD,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
            Method::OPTIONS => write!(f, "OPTIONS"),
            Method::HEAD => write!(f, "HEAD"),
        }
    }
}

/// Query filter operators understood by the backend filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FilterOperator {
    Co,
    Eq,
    Ge,
    Gt,
    In,
    Le,
    Lt,
    Ne,
    Pr,
    IsNull,
    Sw,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Co => "co",
            FilterOperator::Eq => "eq",
            FilterOperator::Ge => "ge",
            FilterOperator::Gt => "gt",
            FilterOperator::In => "in",
            FilterOperator::Le => "le",
            FilterOperator::Lt => "lt",
            FilterOperator::Ne => "ne",
            FilterOperator::Pr => "pr",
            FilterOperator::IsNull => "isnull",
            FilterOperator::Sw => "sw",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "co" => Some(FilterOperator::Co),
            "eq" => Some(FilterOperator::Eq),
            "ge" => Some(FilterOperator::Ge),
            "gt" => Some(FilterOperator::Gt),
            "in" => Some(FilterOperator::In),
            "le" => Some(FilterOperator::Le),
            "lt" => Some(FilterOperator::Lt),
            "ne" => Some(FilterOperator::Ne),
            "pr" => Some(FilterOperator::Pr),
            "isnull" => Some(FilterOperator::IsNull),
            "sw" => Some(FilterOperator::Sw),
            _ => None,
        }
    }

    /// `pr` and `isnull` test presence only and never need an example value.
    pub fn needs_example(&self) -> bool {
        !matches!(self, FilterOperator::Pr | FilterOperator::IsNull)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status flags attached to an endpoint result. Each flag is recorded once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointStatus {
    InvalidSchema,
    ApiSchemaMismatch,
    AdditionalProperties,
    UndocumentedFilters,
    UnsupportedFilters,
    UndocumentedSorters,
    UnsupportedSorters,
    UndocumentedUserLevels,
    UnsupportedUserLevels,
    NoData,
    PathParamUnresolved,
    SchemaNotFound,
    ApiError,
}

impl EndpointStatus {
    pub const ALL: [EndpointStatus; 13] = [
        EndpointStatus::InvalidSchema,
        EndpointStatus::ApiSchemaMismatch,
        EndpointStatus::AdditionalProperties,
        EndpointStatus::UndocumentedFilters,
        EndpointStatus::UnsupportedFilters,
        EndpointStatus::UndocumentedSorters,
        EndpointStatus::UnsupportedSorters,
        EndpointStatus::UndocumentedUserLevels,
        EndpointStatus::UnsupportedUserLevels,
        EndpointStatus::NoData,
        EndpointStatus::PathParamUnresolved,
        EndpointStatus::SchemaNotFound,
        EndpointStatus::ApiError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::InvalidSchema => "INVALID_SCHEMA",
            EndpointStatus::ApiSchemaMismatch => "API_SCHEMA_MISMATCH",
            EndpointStatus::AdditionalProperties => "ADDITIONAL_PROPERTIES",
            EndpointStatus::UndocumentedFilters => "UNDOCUMENTED_FILTERS",
            EndpointStatus::UnsupportedFilters => "UNSUPPORTED_FILTERS",
            EndpointStatus::UndocumentedSorters => "UNDOCUMENTED_SORTERS",
            EndpointStatus::UnsupportedSorters => "UNSUPPORTED_SORTERS",
            EndpointStatus::UndocumentedUserLevels => "UNDOCUMENTED_USER_LEVELS",
            EndpointStatus::UnsupportedUserLevels => "UNSUPPORTED_USER_LEVELS",
            EndpointStatus::NoData => "NO_DATA",
            EndpointStatus::PathParamUnresolved => "PATH_PARAM_UNRESOLVED",
            EndpointStatus::SchemaNotFound => "SCHEMA_NOT_FOUND",
            EndpointStatus::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported problem with an optional representative payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub message: String,
    pub data: Option<Value>,
}

impl ErrorEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Reserved list buckets. Reports carrying any of these keys are never
/// treated as schema-error maps by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    UndocumentedFilters,
    UnsupportedFilters,
    UndocumentedSorters,
    UnsupportedSorters,
    UndocumentedUserLevels,
    UnsupportedUserLevels,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::UndocumentedFilters,
        Bucket::UnsupportedFilters,
        Bucket::UndocumentedSorters,
        Bucket::UnsupportedSorters,
        Bucket::UndocumentedUserLevels,
        Bucket::UnsupportedUserLevels,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Bucket::UndocumentedFilters => "undocumentedFilters",
            Bucket::UnsupportedFilters => "unsupportedFilters",
            Bucket::UndocumentedSorters => "undocumentedSorters",
            Bucket::UnsupportedSorters => "unsupportedSorters",
            Bucket::UndocumentedUserLevels => "undocumentedUserLevels",
            Bucket::UnsupportedUserLevels => "unsupportedUserLevels",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Bucket::ALL.into_iter().find(|bucket| bucket.key() == key)
    }

    /// Status flag raised when this bucket is non-empty.
    pub fn status(&self) -> EndpointStatus {
        match self {
            Bucket::UndocumentedFilters => EndpointStatus::UndocumentedFilters,
            Bucket::UnsupportedFilters => EndpointStatus::UnsupportedFilters,
            Bucket::UndocumentedSorters => EndpointStatus::UndocumentedSorters,
            Bucket::UnsupportedSorters => EndpointStatus::UnsupportedSorters,
            Bucket::UndocumentedUserLevels => EndpointStatus::UndocumentedUserLevels,
            Bucket::UnsupportedUserLevels => EndpointStatus::UnsupportedUserLevels,
        }
    }
}

/// One value under a report's error map: a keyed single entry (schema
/// errors, synthetic spec-defect errors) or a reserved bucket list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Finding {
    Entry(ErrorEntry),
    List(Vec<ErrorEntry>),
}

/// Output of one validator for one endpoint, before aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub method: Method,
    pub endpoint: String,
    pub tag: Option<String>,
    pub status: Vec<EndpointStatus>,
    pub errors: BTreeMap<String, Finding>,
}

impl ValidationReport {
    pub fn new(method: Method, endpoint: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            tag,
            status: Vec::new(),
            errors: BTreeMap::new(),
        }
    }

    /// Report shaped for a bucket-producing validator: both of its buckets
    /// are present even when empty.
    pub fn with_buckets(
        method: Method,
        endpoint: impl Into<String>,
        tag: Option<String>,
        buckets: [Bucket; 2],
    ) -> Self {
        let mut report = Self::new(method, endpoint, tag);
        for bucket in buckets {
            report
                .errors
                .insert(bucket.key().to_string(), Finding::List(Vec::new()));
        }
        report
    }

    pub fn flag(&mut self, status: EndpointStatus) {
        if !self.status.contains(&status) {
            self.status.push(status);
        }
    }

    /// Insert a keyed entry; the first entry recorded for a key wins.
    pub fn insert_entry(&mut self, key: impl Into<String>, entry: ErrorEntry) {
        self.errors
            .entry(key.into())
            .or_insert(Finding::Entry(entry));
    }

    pub fn push_to_bucket(&mut self, bucket: Bucket, entry: ErrorEntry) {
        let slot = self
            .errors
            .entry(bucket.key().to_string())
            .or_insert_with(|| Finding::List(Vec::new()));
        match slot {
            Finding::List(list) => list.push(entry),
            Finding::Entry(_) => *slot = Finding::List(vec![entry]),
        }
        self.flag(bucket.status());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.values().all(|finding| match finding {
            Finding::Entry(_) => false,
            Finding::List(list) => list.is_empty(),
        })
    }
}

/// Aggregate for one (method, versioned endpoint) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointResult {
    pub method: Option<Method>,
    pub endpoint: String,
    pub tag: Option<String>,
    pub status: Vec<EndpointStatus>,
    pub schema_errors: BTreeMap<String, ErrorEntry>,
    pub undocumented_filters: Vec<ErrorEntry>,
    pub unsupported_filters: Vec<ErrorEntry>,
    pub undocumented_sorters: Vec<ErrorEntry>,
    pub unsupported_sorters: Vec<ErrorEntry>,
    pub undocumented_user_levels: Vec<ErrorEntry>,
    pub unsupported_user_levels: Vec<ErrorEntry>,
}

impl EndpointResult {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn bucket(&self, bucket: Bucket) -> &[ErrorEntry] {
        match bucket {
            Bucket::UndocumentedFilters => &self.undocumented_filters,
            Bucket::UnsupportedFilters => &self.unsupported_filters,
            Bucket::UndocumentedSorters => &self.undocumented_sorters,
            Bucket::UnsupportedSorters => &self.unsupported_sorters,
            Bucket::UndocumentedUserLevels => &self.undocumented_user_levels,
            Bucket::UnsupportedUserLevels => &self.unsupported_user_levels,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<ErrorEntry> {
        match bucket {
            Bucket::UndocumentedFilters => &mut self.undocumented_filters,
            Bucket::UnsupportedFilters => &mut self.unsupported_filters,
            Bucket::UndocumentedSorters => &mut self.undocumented_sorters,
            Bucket::UnsupportedSorters => &mut self.unsupported_sorters,
            Bucket::UndocumentedUserLevels => &mut self.undocumented_user_levels,
            Bucket::UnsupportedUserLevels => &mut self.unsupported_user_levels,
        }
    }

    pub fn flag(&mut self, status: EndpointStatus) {
        if !self.status.contains(&status) {
            self.status.push(status);
        }
    }

    pub fn error_count(&self) -> usize {
        self.schema_errors.len()
            + Bucket::ALL
                .iter()
                .map(|bucket| self.bucket(*bucket).len())
                .sum::<usize>()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Endpoint path as reported: the version segment prefixed to the spec path.
pub fn versioned_endpoint(version: &str, path: &str) -> String {
    format!("/{}{}", version.trim_matches('/'), path)
}

/// Aggregation key for an endpoint result.
pub fn endpoint_key(method: Method, endpoint: &str) -> String {
    format!("{} {}", method, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_spec_key() {
        for method in [Method::GET, Method::POST, Method::PATCH, Method::DELETE] {
            assert_eq!(Method::from_spec_key(method.spec_key()), Some(method));
        }
        assert_eq!(Method::from_spec_key("parameters"), None);
    }

    #[test]
    fn operator_tokens_parse_case_insensitively() {
        assert_eq!(FilterOperator::parse(" EQ "), Some(FilterOperator::Eq));
        assert_eq!(FilterOperator::parse("isnull"), Some(FilterOperator::IsNull));
        assert_eq!(FilterOperator::parse("between"), None);
        assert!(!FilterOperator::Pr.needs_example());
        assert!(FilterOperator::Sw.needs_example());
    }

    #[test]
    fn push_to_bucket_flags_status_once() {
        let mut report = ValidationReport::with_buckets(
            Method::GET,
            "/v3/accounts",
            None,
            [Bucket::UndocumentedFilters, Bucket::UnsupportedFilters],
        );
        assert!(report.is_clean());
        report.push_to_bucket(Bucket::UnsupportedFilters, ErrorEntry::new("a"));
        report.push_to_bucket(Bucket::UnsupportedFilters, ErrorEntry::new("b"));
        assert_eq!(report.status, vec![EndpointStatus::UnsupportedFilters]);
        assert!(!report.is_clean());
    }

    #[test]
    fn first_keyed_entry_wins() {
        let mut report = ValidationReport::new(Method::GET, "/v3/accounts", None);
        report.insert_entry("/items/type", ErrorEntry::new("first"));
        report.insert_entry("/items/type", ErrorEntry::new("second"));
        assert_eq!(
            report.errors.get("/items/type"),
            Some(&Finding::Entry(ErrorEntry::new("first")))
        );
    }

    #[test]
    fn endpoint_key_combines_method_and_versioned_path() {
        let endpoint = versioned_endpoint("v3", "/accounts");
        assert_eq!(endpoint, "/v3/accounts");
        assert_eq!(endpoint_key(Method::GET, &endpoint), "GET /v3/accounts");
    }
}
