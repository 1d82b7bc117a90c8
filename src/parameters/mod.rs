// Path parameter handling
//
// - substitution: template parsing and value lookup over JSON records
// - resolver: turns templated paths into concrete ones using live data

pub mod resolver;
pub mod substitution;

pub use resolver::PathResolver;
pub use substitution::{extract_path_params, find_value_by_key, lookup_path, substitute_params};
