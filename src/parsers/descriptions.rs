// Parser for the operator documentation embedded in parameter descriptions
//
// Filters are documented one property per line:
//   **name**: *eq, in, sw*
// Sorters are documented on a single line:
//   Sorting is supported for the following fields: **id, name, created**

use crate::error::DescriptionError;
use crate::models::FilterOperator;
use std::collections::BTreeMap;

/// Documented filter operators per property, in documentation order.
pub type DocumentedFilterSet = BTreeMap<String, Vec<FilterOperator>>;

const PROPERTY_MARKER: &str = "**:";
pub const SORTER_MARKER: &str = "Sorting is supported for the following fields:";

/// Parse every `**prop**: op, op` line of a `filters` description.
///
/// Lines without the marker are prose and ignored. A marked line without a
/// property, without operators, or with an operator the grammar does not
/// know is a documentation defect.
pub fn parse_filters(description: &str) -> Result<DocumentedFilterSet, DescriptionError> {
    let mut documented = DocumentedFilterSet::new();

    for (index, line) in description.lines().enumerate() {
        if !line.contains(PROPERTY_MARKER) {
            continue;
        }
        let stripped = line.replace('*', "");
        let (property, operators) = stripped.split_once(':').unwrap_or((stripped.as_str(), ""));
        let property = property.trim();
        if property.is_empty() {
            return Err(DescriptionError::MissingProperty {
                line: index + 1,
                text: line.to_string(),
            });
        }

        let tokens: Vec<&str> = operators
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(DescriptionError::MissingOperators {
                property: property.to_string(),
            });
        }

        let entry = documented.entry(property.to_string()).or_default();
        for token in tokens {
            let op = FilterOperator::parse(token).ok_or_else(|| DescriptionError::UnknownOperator {
                property: property.to_string(),
                token: token.to_string(),
            })?;
            if !entry.contains(&op) {
                entry.push(op);
            }
        }
    }

    Ok(documented)
}

/// Parse the sortable field list of a `sorters` description.
///
/// `Ok(None)` means the description documents no sorters at all.
pub fn parse_sorters(description: &str) -> Result<Option<Vec<String>>, DescriptionError> {
    let lines: Vec<&str> = description
        .lines()
        .filter(|line| line.contains(SORTER_MARKER))
        .collect();

    match lines.as_slice() {
        [] => Ok(None),
        [line] => {
            let stripped = line.replace('*', "");
            let fields = stripped
                .split_once(':')
                .map(|(_, rest)| rest)
                .unwrap_or("")
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            Ok(Some(fields))
        }
        many => Err(DescriptionError::DuplicateSorterLine(many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FilterOperator::*;

    const FILTERS: &str = "Filter results using the standard syntax.\n\
        \n\
        Filtering is supported for the following fields and operators:\n\
        \n\
        **id**: *eq, in*\n\
        \n\
        **name**: *eq, in, sw*\n\
        \n\
        **owner.id**: *eq*";

    #[test]
    fn parses_documented_filter_lines() {
        let documented = parse_filters(FILTERS).unwrap();
        assert_eq!(documented.len(), 3);
        assert_eq!(documented["id"], vec![Eq, In]);
        assert_eq!(documented["name"], vec![Eq, In, Sw]);
        assert_eq!(documented["owner.id"], vec![Eq]);
    }

    #[test]
    fn prose_only_description_documents_nothing() {
        assert!(parse_filters("Any filter text without markers").unwrap().is_empty());
    }

    #[test]
    fn unknown_operator_is_a_defect() {
        let err = parse_filters("**name**: *eq, between*").unwrap_err();
        assert_eq!(
            err,
            DescriptionError::UnknownOperator {
                property: "name".to_string(),
                token: "between".to_string()
            }
        );
    }

    #[test]
    fn missing_operators_is_a_defect() {
        assert!(matches!(
            parse_filters("**name**:"),
            Err(DescriptionError::MissingOperators { .. })
        ));
        assert!(matches!(
            parse_filters("**: *eq*"),
            Err(DescriptionError::MissingProperty { line: 1, .. })
        ));
    }

    #[test]
    fn parses_sorter_line() {
        let description = "Sort parameter.\n\nSorting is supported for the following fields: **id, name, created**";
        assert_eq!(
            parse_sorters(description).unwrap(),
            Some(vec!["id".to_string(), "name".to_string(), "created".to_string()])
        );
        assert_eq!(parse_sorters("nothing here").unwrap(), None);
    }

    #[test]
    fn duplicate_sorter_lines_are_a_defect() {
        let description = format!("{} **id**\n{} **name**", SORTER_MARKER, SORTER_MARKER);
        assert_eq!(
            parse_sorters(&description),
            Err(DescriptionError::DuplicateSorterLine(2))
        );
    }
}
