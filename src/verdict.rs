// Verdict engine for Specter
// Pure classification of observed behavior: access probes, filtered records
// and sort orderings. No I/O happens here.

use crate::models::FilterOperator;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;

/// Outcome of one privilege-level probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    /// Accepted although the level is not documented.
    Undocumented,
    /// Forbidden although the level is documented.
    Unsupported,
    /// Behavior matches the documentation.
    Consistent,
    /// Any other status; says nothing about authorization.
    Inconclusive,
}

/// Decide a privilege-level verdict from the probe status.
///
/// 1. 2xx for an undocumented level = UNDOCUMENTED
/// 2. 403 for a documented level = UNSUPPORTED
/// 3. 2xx documented / 403 undocumented = CONSISTENT
/// 4. anything else = INCONCLUSIVE
pub fn decide_access_verdict(status: u16, documented: bool) -> AccessVerdict {
    match (status, documented) {
        (200..=299, false) => AccessVerdict::Undocumented,
        (200..=299, true) => AccessVerdict::Consistent,
        (403, true) => AccessVerdict::Unsupported,
        (403, false) => AccessVerdict::Consistent,
        _ => AccessVerdict::Inconclusive,
    }
}

fn as_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Order two JSON scalars. Date strings compare as instants, other strings
/// lexicographically, numbers numerically. Mixed kinds do not compare.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_datetime(a), as_datetime(b)) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Whether one record's property value honors a filter.
///
/// `partial` is the search text for `co` and `sw`, already lowercased.
pub fn record_satisfies(
    op: FilterOperator,
    actual: Option<&Value>,
    example: &Value,
    partial: Option<&str>,
) -> bool {
    let ordering = || actual.and_then(|value| compare_values(value, example));
    match op {
        FilterOperator::Eq | FilterOperator::In => actual.map_or(false, |v| values_equal(v, example)),
        FilterOperator::Ne => !actual.map_or(false, |v| values_equal(v, example)),
        FilterOperator::Gt => ordering() == Some(Ordering::Greater),
        FilterOperator::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        FilterOperator::Lt => ordering() == Some(Ordering::Less),
        FilterOperator::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        FilterOperator::Co => match (actual.and_then(Value::as_str), partial) {
            (Some(text), Some(partial)) => text.to_lowercase().contains(partial),
            _ => false,
        },
        FilterOperator::Sw => match (actual.and_then(Value::as_str), partial) {
            (Some(text), Some(partial)) => text.to_lowercase().starts_with(partial),
            _ => false,
        },
        FilterOperator::Pr => !is_null(actual),
        FilterOperator::IsNull => is_null(actual),
    }
}

/// Operators for which an empty filtered response proves nothing works.
pub fn empty_result_is_unsupported(op: FilterOperator) -> bool {
    matches!(
        op,
        FilterOperator::Eq
            | FilterOperator::Ne
            | FilterOperator::Ge
            | FilterOperator::Gt
            | FilterOperator::Le
            | FilterOperator::Lt
            | FilterOperator::In
    )
}

/// Decide whether a sort works from the first record of each ordering.
///
/// Nulls sort first, so a null ascending head against a non-null descending
/// head means the sort works; the reverse means it does not.
pub fn decide_sort_verdict(ascending: Option<&Value>, descending: Option<&Value>) -> bool {
    let asc = ascending.filter(|v| !v.is_null());
    let desc = descending.filter(|v| !v.is_null());
    match (asc, desc) {
        (None, None) => false,
        (None, Some(_)) => true,
        (Some(_), None) => false,
        (Some(a), Some(d)) => compare_values(a, d) == Some(Ordering::Less),
    }
}
