// Conformance validators
//
// Each validator probes one axis of one endpoint and returns a
// ValidationReport. Failures never escape: they become status flags or
// synthetic error entries on the report.

pub mod filters;
pub mod properties;
pub mod schema;
pub mod sorters;
pub mod user_levels;

pub use filters::validate_filters;
pub use schema::{validate_create, validate_schema};
pub use sorters::validate_sorters;
pub use user_levels::{validate_user_levels, BrokeredExecutor, LevelExecutor, KNOWN_USER_LEVELS};

use crate::models::{versioned_endpoint, Bucket, ValidationReport};
use crate::spec::Operation;

/// One operation bound to the concrete path it is probed at.
#[derive(Debug, Clone)]
pub struct EndpointTarget<'a> {
    pub operation: Operation<'a>,
    /// Concrete path relative to the version base URL.
    pub concrete_path: String,
}

impl<'a> EndpointTarget<'a> {
    pub fn new(operation: Operation<'a>, concrete_path: impl Into<String>) -> Self {
        Self {
            operation,
            concrete_path: concrete_path.into(),
        }
    }

    /// Reported endpoint: the templated path with its version prefix.
    pub fn endpoint(&self) -> String {
        versioned_endpoint(self.operation.version, self.operation.path)
    }

    pub fn report(&self) -> ValidationReport {
        ValidationReport::new(self.operation.method, self.endpoint(), self.operation.tag())
    }

    pub fn report_with_buckets(&self, buckets: [Bucket; 2]) -> ValidationReport {
        ValidationReport::with_buckets(
            self.operation.method,
            self.endpoint(),
            self.operation.tag(),
            buckets,
        )
    }
}
