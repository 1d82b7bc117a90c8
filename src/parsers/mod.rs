pub mod descriptions;
pub mod openapi;

pub use descriptions::{parse_filters, parse_sorters, DocumentedFilterSet};
pub use openapi::OpenApiLoader;

use crate::error::SpecError;
use crate::spec::SpecSet;

/// Source of versioned API descriptions.
pub trait SpecSource {
    /// Load every description found at `location` (a file or a directory).
    fn load(&self, location: &str) -> Result<SpecSet, SpecError>;
}
