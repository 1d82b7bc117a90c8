// Sorter matrix
//
// Each sortable property is requested in ascending and descending order and
// the heads of both orderings are compared.

use crate::client::ApiClient;
use crate::models::{Bucket, ErrorEntry, ValidationReport};
use crate::parameters::substitution::lookup_path;
use crate::parsers::descriptions::parse_sorters;
use crate::response_analysis::records;
use crate::spec::{first_branch, schema_type};
use crate::validators::properties::flatten_properties;
use crate::validators::EndpointTarget;
use crate::verdict::decide_sort_verdict;
use futures::future::join_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    Supported,
    Unsupported,
    /// Fewer than two records came back; nothing can be concluded.
    Untestable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestedSorter {
    pub name: String,
    pub outcome: SortOutcome,
}

async fn test_sorter(client: &dyn ApiClient, path: &str, property: String) -> TestedSorter {
    let outcome = match client.get(path, &[("sorters", property.clone())]).await {
        Err(err) => {
            tracing::debug!(path, property = %property, error = %err, "ascending sort failed");
            SortOutcome::Unsupported
        }
        Ok(ascending) => {
            let asc_records = records(&ascending.body);
            if asc_records.len() < 2 {
                SortOutcome::Untestable
            } else {
                match client.get(path, &[("sorters", format!("-{}", property))]).await {
                    Err(err) => {
                        tracing::debug!(path, property = %property, error = %err, "descending sort failed");
                        SortOutcome::Unsupported
                    }
                    Ok(descending) => {
                        let asc_head = asc_records.first().and_then(|r| lookup_path(r, &property));
                        let desc_head = records(&descending.body)
                            .first()
                            .and_then(|r| lookup_path(r, &property));
                        if decide_sort_verdict(asc_head, desc_head) {
                            SortOutcome::Supported
                        } else {
                            SortOutcome::Unsupported
                        }
                    }
                }
            }
        }
    };
    TestedSorter {
        name: property,
        outcome,
    }
}

/// Probe every property concurrently.
pub async fn test_sorters(client: &dyn ApiClient, path: &str, properties: Vec<String>) -> Vec<TestedSorter> {
    join_all(properties.into_iter().map(|p| test_sorter(client, path, p))).await
}

/// Undocumented and unsupported findings, in that order. Untestable
/// properties are never reported.
pub fn diff_sorters(tested: &[TestedSorter], documented: &[String]) -> (Vec<ErrorEntry>, Vec<ErrorEntry>) {
    let mut undocumented = Vec::new();
    let mut unsupported = Vec::new();
    for sorter in tested {
        let is_documented = documented.iter().any(|d| d == &sorter.name);
        match (sorter.outcome, is_documented) {
            (SortOutcome::Unsupported, true) => unsupported.push(ErrorEntry::new(format!(
                "The property `{}` **MIGHT NOT** support sorting but the documentation says it does. Please manually verify.",
                sorter.name
            ))),
            (SortOutcome::Supported, false) => undocumented.push(ErrorEntry::new(format!(
                "The property `{}` **MIGHT** support sorting but it is not documented. Please manually verify.",
                sorter.name
            ))),
            _ => {}
        }
    }
    (undocumented, unsupported)
}

/// Sorter conformance for a collection GET. Runs when the operation
/// documents a `sorters` parameter or returns a list.
pub async fn validate_sorters(client: &dyn ApiClient, target: &EndpointTarget<'_>) -> ValidationReport {
    let mut report = target.report_with_buckets([Bucket::UndocumentedSorters, Bucket::UnsupportedSorters]);
    let Some(schema) = target.operation.response_schema(&["200"]) else {
        return report;
    };

    let sorters_param = target.operation.parameter("sorters");
    let returns_list = schema_type(first_branch(schema)) == Some("array");
    if sorters_param.is_none() && !returns_list {
        return report;
    }

    let description = sorters_param.and_then(|p| p.description()).unwrap_or("");
    let documented = match parse_sorters(description) {
        Ok(documented) => documented.unwrap_or_default(),
        Err(err) => {
            let mut defect = target.report();
            defect.insert_entry(
                "Invalid Sorters",
                ErrorEntry::new(format!(
                    "Unable to parse the sorters due to improper format: {}",
                    err
                )),
            );
            return defect;
        }
    };

    let properties = flatten_properties(schema).into_iter().map(|p| p.name).collect();
    let tested = test_sorters(client, &target.concrete_path, properties).await;
    let (undocumented, unsupported) = diff_sorters(&tested, &documented);
    for entry in undocumented {
        report.push_to_bucket(Bucket::UndocumentedSorters, entry);
    }
    for entry in unsupported {
        report.push_to_bucket(Bucket::UnsupportedSorters, entry);
    }
    report
}
