// Filter matrix
//
// Every primitive response property is probed with each operator its type
// admits. Observed support is then diffed against the operators documented
// in the `filters` parameter description.

use crate::client::ApiClient;
use crate::error::HttpError;
use crate::models::{Bucket, EndpointStatus, ErrorEntry, FilterOperator, ValidationReport};
use crate::parameters::substitution::lookup_path;
use crate::parsers::descriptions::{parse_filters, DocumentedFilterSet};
use crate::response_analysis::records;
use crate::validators::properties::{flatten_properties, FlatProperty, PropertyType};
use crate::validators::EndpointTarget;
use crate::verdict::{empty_result_is_unsupported, record_satisfies};
use futures::future::join_all;
use serde_json::Value;

const STRING_OPERATORS: [FilterOperator; 11] = [
    FilterOperator::Co,
    FilterOperator::Eq,
    FilterOperator::Ge,
    FilterOperator::Gt,
    FilterOperator::In,
    FilterOperator::Le,
    FilterOperator::Lt,
    FilterOperator::Ne,
    FilterOperator::Pr,
    FilterOperator::IsNull,
    FilterOperator::Sw,
];

const BOOLEAN_OPERATORS: [FilterOperator; 4] = [
    FilterOperator::Eq,
    FilterOperator::Ne,
    FilterOperator::Pr,
    FilterOperator::IsNull,
];

const NUMBER_OPERATORS: [FilterOperator; 8] = [
    FilterOperator::Eq,
    FilterOperator::Ne,
    FilterOperator::Pr,
    FilterOperator::IsNull,
    FilterOperator::Gt,
    FilterOperator::Ge,
    FilterOperator::Lt,
    FilterOperator::Le,
];

/// Operators applicable to a property type. `co` is dropped entirely when
/// contains filtering is forbidden.
pub fn operators_for(ty: PropertyType, forbid_contains: bool) -> Vec<FilterOperator> {
    let ops: &[FilterOperator] = match ty {
        PropertyType::String => &STRING_OPERATORS,
        PropertyType::Boolean => &BOOLEAN_OPERATORS,
        PropertyType::Number => &NUMBER_OPERATORS,
        PropertyType::Unknown => &[],
    };
    ops.iter()
        .copied()
        .filter(|op| !(forbid_contains && *op == FilterOperator::Co))
        .collect()
}

/// Middle third of the example, by character.
pub fn contains_partial(example: &str) -> String {
    let chars: Vec<char> = example.chars().collect();
    let len = chars.len();
    chars[len / 3..2 * len / 3].iter().collect()
}

/// First half of the example, by character.
pub fn startswith_partial(example: &str) -> String {
    example.chars().take(example.chars().count() / 2).collect()
}

/// Render a filter expression in the backend's filter grammar.
pub fn filter_expression(op: FilterOperator, property: &str, value: &Value) -> String {
    let literal = match value {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    };
    match op {
        FilterOperator::Pr => format!("pr {}", property),
        FilterOperator::IsNull => format!("{} isnull", property),
        FilterOperator::In => format!("{} in ({})", property, literal),
        _ => format!("{} {} {}", property, op, literal),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: PropertyType,
    pub operators: Vec<FilterOperator>,
    pub supported: Vec<FilterOperator>,
    pub unsupported: Vec<FilterOperator>,
}

impl PropertyDescriptor {
    pub fn new(property: &FlatProperty, forbid_contains: bool) -> Self {
        Self {
            name: property.name.clone(),
            ty: property.ty,
            operators: operators_for(property.ty, forbid_contains),
            supported: Vec::new(),
            unsupported: Vec::new(),
        }
    }

    fn record(&mut self, op: FilterOperator, supported: bool) {
        let list = if supported {
            &mut self.supported
        } else {
            &mut self.unsupported
        };
        if !list.contains(&op) {
            list.push(op);
        }
    }

    /// Accept the documented operators without probing them.
    fn assume_documented(&mut self, documented: &DocumentedFilterSet) {
        if let Some(ops) = documented.get(&self.name) {
            for op in ops {
                self.record(*op, true);
            }
        }
    }
}

/// Result of running the matrix over one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TestedFilters {
    pub properties: Vec<PropertyDescriptor>,
    /// The control request returned nothing; support was assumed.
    pub no_data: bool,
}

/// Probe one operator. Any request failure counts as unsupported.
async fn probe(
    client: &dyn ApiClient,
    path: &str,
    property: &str,
    op: FilterOperator,
    example: &Value,
) -> bool {
    let (query_value, partial) = match op {
        FilterOperator::Co | FilterOperator::Sw => {
            let Some(text) = example.as_str() else {
                return false;
            };
            let partial = if op == FilterOperator::Co {
                contains_partial(text).to_lowercase()
            } else {
                startswith_partial(text)
            };
            (Value::String(partial.clone()), Some(partial.to_lowercase()))
        }
        _ => (example.clone(), None),
    };

    let expression = filter_expression(op, property, &query_value);
    let response = match client.get(path, &[("filters", expression.clone())]).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(path, filter = %expression, error = %err, "filter probe failed");
            return false;
        }
    };

    let filtered = records(&response.body);
    if filtered.is_empty() {
        return !empty_result_is_unsupported(op);
    }
    filtered
        .iter()
        .all(|record| record_satisfies(op, lookup_path(record, property), example, partial.as_deref()))
}

async fn test_property(
    client: &dyn ApiClient,
    path: &str,
    control: &[&Value],
    mut descriptor: PropertyDescriptor,
    documented: &DocumentedFilterSet,
) -> PropertyDescriptor {
    let example = control
        .iter()
        .filter_map(|record| lookup_path(record, &descriptor.name))
        .find(|value| !value.is_null())
        .cloned();

    let operators = descriptor.operators.clone();
    match example {
        Some(example) => {
            for op in operators {
                let supported = probe(client, path, &descriptor.name, op, &example).await;
                descriptor.record(op, supported);
            }
        }
        None => {
            tracing::debug!(path, property = %descriptor.name, "no non-null example; assuming documented filters work");
            for op in operators.into_iter().filter(|op| !op.needs_example()) {
                let supported = probe(client, path, &descriptor.name, op, &Value::Null).await;
                descriptor.record(op, supported);
            }
            let probed = descriptor.supported.clone();
            descriptor.assume_documented(documented);
            // Presence operators were observed, not assumed.
            descriptor
                .supported
                .retain(|op| op.needs_example() || probed.contains(op));
        }
    }
    descriptor
}

/// Run the filter matrix for every property.
///
/// One unfiltered control request supplies example values. An empty control
/// marks every documented operator as supported and stops.
pub async fn test_filters(
    client: &dyn ApiClient,
    path: &str,
    properties: Vec<PropertyDescriptor>,
    documented: &DocumentedFilterSet,
) -> Result<TestedFilters, HttpError> {
    let control = client.get(path, &[]).await?;
    let control_records = records(&control.body);

    if control_records.is_empty() {
        tracing::debug!(path, "no data; assuming documented filters work");
        let properties = properties
            .into_iter()
            .map(|mut descriptor| {
                descriptor.assume_documented(documented);
                descriptor
            })
            .collect();
        return Ok(TestedFilters {
            properties,
            no_data: true,
        });
    }

    let tested = join_all(
        properties
            .into_iter()
            .map(|descriptor| test_property(client, path, &control_records, descriptor, documented)),
    )
    .await;

    Ok(TestedFilters {
        properties: tested,
        no_data: false,
    })
}

/// Undocumented and unsupported findings, in that order.
pub fn diff_filters(
    tested: &[PropertyDescriptor],
    documented: &DocumentedFilterSet,
) -> (Vec<ErrorEntry>, Vec<ErrorEntry>) {
    let mut undocumented = Vec::new();
    let mut unsupported = Vec::new();

    for property in tested {
        let documented_ops = documented
            .get(&property.name)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for op in &property.supported {
            if !documented_ops.contains(op) {
                undocumented.push(ErrorEntry::new(format!(
                    "The property `{}` supports the `{}` filter parameter but it is not documented.",
                    property.name, op
                )));
            }
        }
        for op in documented_ops {
            if !property.supported.contains(op) {
                unsupported.push(ErrorEntry::new(format!(
                    "The property `{}` does not support the `{}` filter parameter but the documentation says it does.",
                    property.name, op
                )));
            }
        }
    }

    (undocumented, unsupported)
}

/// Filter conformance for a collection GET.
pub async fn validate_filters(
    client: &dyn ApiClient,
    target: &EndpointTarget<'_>,
    forbid_contains: bool,
) -> ValidationReport {
    let Some(description) = target.operation.parameter("filters").map(|p| p.description().unwrap_or("")) else {
        return target.report_with_buckets([Bucket::UndocumentedFilters, Bucket::UnsupportedFilters]);
    };

    let documented = match parse_filters(description) {
        Ok(documented) => documented,
        Err(err) => {
            let mut report = target.report();
            report.insert_entry(
                "Invalid Filters",
                ErrorEntry::new(format!(
                    "Unable to parse the filters due to improper format: {}",
                    err
                )),
            );
            return report;
        }
    };

    let mut report = target.report_with_buckets([Bucket::UndocumentedFilters, Bucket::UnsupportedFilters]);
    let Some(schema) = target.operation.response_schema(&["200"]) else {
        return report;
    };

    let properties: Vec<PropertyDescriptor> = flatten_properties(schema)
        .iter()
        .filter(|p| p.ty != PropertyType::Unknown)
        .map(|p| PropertyDescriptor::new(p, forbid_contains))
        .collect();

    let tested = match test_filters(client, &target.concrete_path, properties, &documented).await {
        Ok(tested) => tested,
        Err(err) => {
            tracing::warn!(endpoint = %target.endpoint(), error = %err, "filter control request failed");
            report.flag(EndpointStatus::ApiError);
            return report;
        }
    };
    if tested.no_data {
        report.flag(EndpointStatus::NoData);
    }

    let (undocumented, unsupported) = diff_filters(&tested.properties, &documented);
    for entry in undocumented {
        report.push_to_bucket(Bucket::UndocumentedFilters, entry);
    }
    for entry in unsupported {
        report.push_to_bucket(Bucket::UnsupportedFilters, entry);
    }
    report
}
