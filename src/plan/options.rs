//! Option descriptors for every operator type.
//!
//! These are what a front end needs to render an operator's property form;
//! the engine itself reads properties through the typed plan description.

use crate::error::PlanError;
use serde::Serialize;

/// One documented operator property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDescriptor {
    pub name: &'static str,
    pub option_type: &'static str,
    pub required: bool,
    pub description: &'static str,
}

const fn required(
    name: &'static str,
    option_type: &'static str,
    description: &'static str,
) -> OptionDescriptor {
    OptionDescriptor {
        name,
        option_type,
        required: true,
        description,
    }
}

const fn optional(
    name: &'static str,
    option_type: &'static str,
    description: &'static str,
) -> OptionDescriptor {
    OptionDescriptor {
        name,
        option_type,
        required: false,
        description,
    }
}

const ATTRIBUTES: OptionDescriptor =
    required("attributes", "string[]", "Attributes the matcher reads");
const MATCHING_TYPE: OptionDescriptor = required(
    "matchingType",
    "\"Conjunction\" | \"Substring\" | \"Scan\"",
    "How the query is compared with attribute values",
);
const STOP_WORDS: OptionDescriptor = optional(
    "stopWords",
    "boolean",
    "Drop English stop words when tokenizing (default false)",
);
const LIMIT_OPTION: OptionDescriptor = optional("limit", "integer", "Maximum number of tuples");
const OFFSET_OPTION: OptionDescriptor =
    optional("offset", "integer", "Number of tuples to skip first (default 0)");

/// Every operator type a plan may use
pub const OPERATOR_TYPES: &[&str] = &[
    "ScanSource",
    "KeywordSource",
    "Values",
    "KeywordMatcher",
    "FuzzyTokenMatcher",
    "RegexMatcher",
    "DictionaryMatcher",
    "NlpEntity",
    "Comparable",
    "Projection",
    "Limit",
    "Sort",
    "Aggregation",
    "Join",
    "ViewResults",
    "JsonLines",
];

const SCAN_SOURCE: &[OptionDescriptor] = &[
    required("indexName", "string", "Registered index to read"),
    optional("payload", "boolean", "Attach token spans of TEXT attributes"),
    LIMIT_OPTION,
    OFFSET_OPTION,
];

const KEYWORD_SOURCE: &[OptionDescriptor] = &[
    required("indexName", "string", "Registered index to search"),
    required("query", "string", "Keyword query"),
    ATTRIBUTES,
    MATCHING_TYPE,
    STOP_WORDS,
];

const VALUES: &[OptionDescriptor] = &[
    required("attributes", "{attributeName, attributeType}[]", "Schema of the rows"),
    optional("rows", "any[][]", "Literal rows, one value per attribute"),
];

const KEYWORD_MATCHER: &[OptionDescriptor] = &[
    required("query", "string", "Keyword query"),
    ATTRIBUTES,
    MATCHING_TYPE,
    STOP_WORDS,
];

const FUZZY_TOKEN_MATCHER: &[OptionDescriptor] = &[
    required("query", "string", "Query whose tokens are looked for"),
    ATTRIBUTES,
    required(
        "thresholdRatio",
        "number",
        "Fraction of query tokens that must occur, in (0, 1]",
    ),
    STOP_WORDS,
];

const REGEX_MATCHER: &[OptionDescriptor] = &[
    required("regex", "string", "Regular expression"),
    ATTRIBUTES,
    optional("caseInsensitive", "boolean", "Ignore case (default false)"),
];

const DICTIONARY_MATCHER: &[OptionDescriptor] = &[
    required(
        "dictionary",
        "{inline: string[]} | {file: string}",
        "Entries, listed or read one per line from a file",
    ),
    ATTRIBUTES,
    MATCHING_TYPE,
    STOP_WORDS,
];

const NLP_ENTITY: &[OptionDescriptor] = &[
    required(
        "nlpEntityType",
        "string",
        "Entity or part-of-speech selector, e.g. \"person\" or \"noun\"",
    ),
    ATTRIBUTES,
];

const COMPARABLE: &[OptionDescriptor] = &[
    required("attribute", "string", "Attribute to compare"),
    required(
        "comparisonType",
        "\"=\" | \">\" | \">=\" | \"<\" | \"<=\" | \"!=\"",
        "Comparison applied as value <op> compareTo",
    ),
    required("compareTo", "any", "Threshold, of the attribute's type"),
];

const PROJECTION: &[OptionDescriptor] = &[required(
    "attributes",
    "(string | {index, alias?})[]",
    "Output attributes by name or input position",
)];

const LIMIT: &[OptionDescriptor] = &[
    required("limit", "integer", "Maximum number of tuples"),
    OFFSET_OPTION,
];

const SORT: &[OptionDescriptor] = &[required(
    "sortList",
    "{attribute, order?}[]",
    "Sort keys in precedence order; order is \"asc\" or \"desc\"",
)];

const AGGREGATION: &[OptionDescriptor] = &[
    optional("groupBy", "string[]", "Grouping attributes; none for one global row"),
    required(
        "aggregations",
        "{function, attribute?, resultAttribute}[]",
        "Functions: sum, count, average, min, max, concat",
    ),
];

const JOIN: &[OptionDescriptor] = &[
    required(
        "joinType",
        "\"inner\" | \"left outer\" | \"right outer\" | \"full outer\"",
        "Which unmatched tuples are kept",
    ),
    required("innerAttribute", "string", "Join attribute of the first input"),
    required("outerAttribute", "string", "Join attribute of the second input"),
    optional(
        "similarityThreshold",
        "number",
        "Join on token Jaccard similarity at least this value instead of equality",
    ),
];

const VIEW_RESULTS: &[OptionDescriptor] = &[
    LIMIT_OPTION,
    OFFSET_OPTION,
    optional("chartType", "string", "Chart label passed through to front ends"),
];

const JSON_LINES: &[OptionDescriptor] =
    &[optional("path", "string", "Output file (default standard output)")];

/// Options of an operator type, in display order
pub fn describe(operator_type: &str) -> Result<&'static [OptionDescriptor], PlanError> {
    let options = match operator_type {
        "ScanSource" => SCAN_SOURCE,
        "KeywordSource" => KEYWORD_SOURCE,
        "Values" => VALUES,
        "KeywordMatcher" => KEYWORD_MATCHER,
        "FuzzyTokenMatcher" => FUZZY_TOKEN_MATCHER,
        "RegexMatcher" => REGEX_MATCHER,
        "DictionaryMatcher" => DICTIONARY_MATCHER,
        "NlpEntity" => NLP_ENTITY,
        "Comparable" => COMPARABLE,
        "Projection" => PROJECTION,
        "Limit" => LIMIT,
        "Sort" => SORT,
        "Aggregation" => AGGREGATION,
        "Join" => JOIN,
        "ViewResults" => VIEW_RESULTS,
        "JsonLines" => JSON_LINES,
        other => {
            return Err(PlanError::UnknownToken {
                vocabulary: "operator type",
                value: other.to_string(),
            })
        }
    };
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OperatorKind;
    use std::collections::HashSet;

    #[test]
    fn test_every_operator_type_is_described() -> anyhow::Result<()> {
        for operator_type in OPERATOR_TYPES {
            let options = describe(operator_type)?;
            let names: HashSet<_> = options.iter().map(|o| o.name).collect();
            assert_eq!(names.len(), options.len(), "{}", operator_type);
        }
        assert!(matches!(
            describe("Teleport"),
            Err(PlanError::UnknownToken { vocabulary: "operator type", .. })
        ));
        Ok(())
    }

    #[test]
    fn test_required_options_suffice() -> anyhow::Result<()> {
        // A description holding only the required options parses for types
        // whose required options are all plain strings
        let json = serde_json::json!({
            "operatorType": "ScanSource",
            "indexName": "news",
        });
        let kind: OperatorKind = serde_json::from_value(json)?;
        assert_eq!(kind.type_name(), "ScanSource");
        assert!(describe("ScanSource")?.iter().filter(|o| o.required).count() == 1);
        Ok(())
    }

    #[test]
    fn test_descriptors_serialize() -> anyhow::Result<()> {
        let json = serde_json::to_value(describe("Limit")?)?;
        assert_eq!(json[0]["name"], "limit");
        assert_eq!(json[0]["optionType"], "integer");
        assert_eq!(json[1]["required"], false);
        Ok(())
    }
}
