// Reporting and output for Specter
// Console summary, Markdown and JSON export, and the exit-code decision

use crate::aggregate::AggregateMap;
use crate::models::{Bucket, EndpointResult, EndpointStatus, ErrorEntry};
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;

/// Endpoint counts across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub total: usize,
    /// Endpoints without any status flag.
    pub passing: usize,
    pub with_errors: usize,
    pub by_status: BTreeMap<EndpointStatus, usize>,
}

impl CoverageSummary {
    pub fn from_results(results: &AggregateMap) -> Self {
        let mut summary = CoverageSummary {
            total: results.len(),
            ..Self::default()
        };
        for result in results.values() {
            if result.status.is_empty() {
                summary.passing += 1;
            }
            if result.has_errors() {
                summary.with_errors += 1;
            }
            for status in &result.status {
                *summary.by_status.entry(*status).or_insert(0) += 1;
            }
        }
        summary
    }

    pub fn count(&self, status: EndpointStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

fn bucket_title(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::UndocumentedFilters => "Undocumented filters",
        Bucket::UnsupportedFilters => "Unsupported filters",
        Bucket::UndocumentedSorters => "Undocumented sorters",
        Bucket::UnsupportedSorters => "Unsupported sorters",
        Bucket::UndocumentedUserLevels => "Undocumented user levels",
        Bucket::UnsupportedUserLevels => "Unsupported user levels",
    }
}

fn status_list(result: &EndpointResult) -> String {
    result
        .status
        .iter()
        .map(EndpointStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Plain-text summary printed at the end of a run.
pub fn render_console(results: &AggregateMap) -> String {
    let summary = CoverageSummary::from_results(results);
    let mut out = String::new();
    for result in results.values().filter(|r| r.has_errors()) {
        let _ = writeln!(
            out,
            "[{}] {} {} ({} errors)",
            status_list(result),
            result.method.map(|m| m.to_string()).unwrap_or_default(),
            result.endpoint,
            result.error_count()
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Total tested endpoints: {}", summary.total);
    let _ = writeln!(out, "Endpoints without findings: {}", summary.passing);
    for status in EndpointStatus::ALL {
        let count = summary.count(status);
        if count > 0 {
            let _ = writeln!(out, "Endpoints with {}: {}", status, count);
        }
    }
    out
}

fn write_entries(out: &mut String, title: &str, entries: &[&ErrorEntry]) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "### {}\n", title);
    for entry in entries {
        let _ = writeln!(out, "- {}", entry.message);
        if let Some(data) = &entry.data {
            let _ = writeln!(out, "\n  ```json\n  {}\n  ```", data);
        }
    }
    let _ = writeln!(out);
}

pub fn render_markdown(results: &AggregateMap) -> String {
    let summary = CoverageSummary::from_results(results);
    let mut out = String::from("# Specter Report\n\n");
    let _ = writeln!(out, "| Metric | Endpoints |\n|---|---|");
    let _ = writeln!(out, "| Total tested | {} |", summary.total);
    let _ = writeln!(out, "| Without findings | {} |", summary.passing);
    for status in EndpointStatus::ALL {
        let _ = writeln!(out, "| {} | {} |", status, summary.count(status));
    }
    let _ = writeln!(out);

    for result in results.values().filter(|r| r.has_errors()) {
        let _ = writeln!(
            out,
            "## {} {}\n",
            result.method.map(|m| m.to_string()).unwrap_or_default(),
            result.endpoint
        );
        if let Some(tag) = &result.tag {
            let _ = writeln!(out, "Tag: {}\n", tag);
        }
        let _ = writeln!(out, "Status: {}\n", status_list(result));
        let schema_errors: Vec<&ErrorEntry> = result.schema_errors.values().collect();
        write_entries(&mut out, "Schema errors", &schema_errors);
        for bucket in Bucket::ALL {
            let entries: Vec<&ErrorEntry> = result.bucket(bucket).iter().collect();
            write_entries(&mut out, bucket_title(bucket), &entries);
        }
    }
    out
}

pub fn export_markdown(results: &AggregateMap) -> Result<String, std::io::Error> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("specter_report_{}.md", timestamp);
    let mut file = File::create(&filename)?;
    file.write_all(render_markdown(results).as_bytes())?;
    Ok(filename)
}

pub fn export_json(results: &AggregateMap) -> Result<String, std::io::Error> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("specter_report_{}.json", timestamp);
    let file = File::create(&filename)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(filename)
}

/// `1` when any endpoint carries an error entry, else `0`.
pub fn exit_code(results: &AggregateMap) -> u8 {
    if results.values().any(EndpointResult::has_errors) {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;

    fn results() -> AggregateMap {
        let mut failing = EndpointResult::new(Method::GET, "/v3/accounts");
        failing.flag(EndpointStatus::UnsupportedSorters);
        failing
            .unsupported_sorters
            .push(ErrorEntry::new("The property `name` **MIGHT NOT** support sorting"));
        let mut empty = EndpointResult::new(Method::GET, "/v3/sources");
        empty.flag(EndpointStatus::NoData);
        let clean = EndpointResult::new(Method::GET, "/v3/identities");

        AggregateMap::from([
            ("GET /v3/accounts".to_string(), failing),
            ("GET /v3/sources".to_string(), empty),
            ("GET /v3/identities".to_string(), clean),
        ])
    }

    #[test]
    fn summary_counts_statuses() {
        let summary = CoverageSummary::from_results(&results());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passing, 1);
        assert_eq!(summary.with_errors, 1);
        assert_eq!(summary.count(EndpointStatus::NoData), 1);
        assert_eq!(summary.count(EndpointStatus::ApiError), 0);
    }

    #[test]
    fn flags_without_entries_do_not_fail_the_run() {
        let mut only_flags = results();
        only_flags.remove("GET /v3/accounts");
        assert_eq!(exit_code(&only_flags), 0);
        assert_eq!(exit_code(&results()), 1);
    }

    #[test]
    fn markdown_lists_failing_endpoints_only() {
        let markdown = render_markdown(&results());
        assert!(markdown.contains("## GET /v3/accounts"));
        assert!(markdown.contains("### Unsupported sorters"));
        assert!(!markdown.contains("## GET /v3/identities"));
    }

    #[test]
    fn console_reports_totals() {
        let console = render_console(&results());
        assert!(console.contains("[UNSUPPORTED_SORTERS] GET /v3/accounts (1 errors)"));
        assert!(console.contains("Total tested endpoints: 3"));
    }
}
