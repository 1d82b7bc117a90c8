// Error aggregation
//
// Folds validator reports into one EndpointResult per (method, endpoint).
// Bucket reports and keyed schema-error reports never mix.

use crate::models::{endpoint_key, Bucket, EndpointResult, Finding, ValidationReport};
use std::collections::BTreeMap;

pub type AggregateMap = BTreeMap<String, EndpointResult>;

/// Whether any key of the report names a reserved bucket.
fn is_bucket_report(report: &ValidationReport) -> bool {
    report.errors.keys().any(|key| Bucket::from_key(key).is_some())
}

/// Fold one report into `results`.
pub fn merge_into(results: &mut AggregateMap, report: ValidationReport) {
    let key = endpoint_key(report.method, &report.endpoint);
    let result = results
        .entry(key)
        .or_insert_with(|| EndpointResult::new(report.method, report.endpoint.clone()));
    if result.tag.is_none() {
        result.tag = report.tag.clone();
    }
    for status in &report.status {
        result.flag(*status);
    }

    if is_bucket_report(&report) {
        for (key, finding) in report.errors {
            let Some(bucket) = Bucket::from_key(&key) else {
                tracing::debug!(endpoint = %result.endpoint, key = %key, "dropping stray key from bucket report");
                continue;
            };
            let entries = match finding {
                Finding::List(entries) => entries,
                Finding::Entry(entry) => vec![entry],
            };
            if !entries.is_empty() {
                result.flag(bucket.status());
            }
            result.bucket_mut(bucket).extend(entries);
        }
    } else {
        for (key, finding) in report.errors {
            match finding {
                Finding::Entry(entry) => {
                    result.schema_errors.entry(key).or_insert(entry);
                }
                Finding::List(entries) => {
                    if let Some(entry) = entries.into_iter().next() {
                        result.schema_errors.entry(key).or_insert(entry);
                    }
                }
            }
        }
    }
}

/// Fold a batch of reports. Pure: the same list merged twice yields every
/// bucket entry twice.
pub fn merge(reports: impl IntoIterator<Item = ValidationReport>) -> AggregateMap {
    let mut results = AggregateMap::new();
    for report in reports {
        merge_into(&mut results, report);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointStatus, ErrorEntry, Method};

    fn filter_report(message: &str) -> ValidationReport {
        let mut report = ValidationReport::with_buckets(
            Method::GET,
            "/v3/accounts",
            Some("Accounts".into()),
            [Bucket::UndocumentedFilters, Bucket::UnsupportedFilters],
        );
        report.push_to_bucket(Bucket::UnsupportedFilters, ErrorEntry::new(message));
        report
    }

    fn schema_report() -> ValidationReport {
        let mut report = ValidationReport::new(Method::GET, "/v3/accounts", Some("Accounts".into()));
        report.flag(EndpointStatus::ApiSchemaMismatch);
        report.insert_entry("/items/properties/id/type", ErrorEntry::new("bad id"));
        report
    }

    #[test]
    fn reports_for_one_endpoint_share_a_result() {
        let merged = merge(vec![filter_report("a"), schema_report()]);
        assert_eq!(merged.len(), 1);
        let result = &merged["GET /v3/accounts"];
        assert_eq!(result.unsupported_filters.len(), 1);
        assert!(result.undocumented_filters.is_empty());
        assert_eq!(result.schema_errors.len(), 1);
        assert_eq!(result.tag.as_deref(), Some("Accounts"));
        assert!(result.status.contains(&EndpointStatus::UnsupportedFilters));
        assert!(result.status.contains(&EndpointStatus::ApiSchemaMismatch));
    }

    #[test]
    fn bucket_keys_never_land_in_schema_errors() {
        let merged = merge(vec![filter_report("a")]);
        assert!(merged["GET /v3/accounts"].schema_errors.is_empty());
    }

    #[test]
    fn keyed_defect_reports_land_in_schema_errors() {
        let mut report = ValidationReport::new(Method::GET, "/v3/accounts", None);
        report.insert_entry("Invalid Filters", ErrorEntry::new("bad prose"));
        let merged = merge(vec![report]);
        assert!(merged["GET /v3/accounts"].schema_errors.contains_key("Invalid Filters"));
    }

    #[test]
    fn merge_is_a_plain_fold() {
        let reports = vec![filter_report("a"), filter_report("b")];
        let twice: Vec<ValidationReport> = reports.iter().cloned().chain(reports.clone()).collect();
        let merged = merge(twice);
        let result = &merged["GET /v3/accounts"];
        assert_eq!(result.unsupported_filters.len(), 4);
        assert_eq!(result.status, vec![EndpointStatus::UnsupportedFilters]);
    }

    #[test]
    fn methods_are_kept_apart() {
        let mut post = ValidationReport::new(Method::POST, "/v3/accounts", None);
        post.flag(EndpointStatus::ApiError);
        let merged = merge(vec![schema_report(), post]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["POST /v3/accounts"].status, vec![EndpointStatus::ApiError]);
    }
}
