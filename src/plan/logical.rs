//! Serialized plan descriptions.
//!
//! A plan is a list of operators, each with an id, an `operatorType` and its
//! properties, plus the links between them:
//!
//! ```json
//! {
//!   "operators": [
//!     {"operatorId": "scan", "operatorType": "ScanSource", "indexName": "news"},
//!     {"operatorId": "kw", "operatorType": "KeywordMatcher",
//!      "query": "book", "attributes": ["content"], "matchingType": "Conjunction"},
//!     {"operatorId": "out", "operatorType": "ViewResults"}
//!   ],
//!   "links": [
//!     {"origin": "scan", "destination": "kw"},
//!     {"origin": "kw", "destination": "out"}
//!   ]
//! }
//! ```
//!
//! Inputs of an operator are ordered by the position of their links in the
//! list; for a join the first input is the inner side.

use crate::data::Attribute;
use crate::error::PlanError;
use crate::matcher::{ComparisonType, Dictionary, KeywordMatchingType, NlpEntityType};
use crate::operator::{AggregateSpec, JoinType, ProjectedField, SortCriteria};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// A whole plan as read from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalPlan {
    pub operators: Vec<OperatorDescription>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorDescription {
    pub operator_id: String,
    #[serde(flatten)]
    pub kind: OperatorKind,
}

impl OperatorDescription {
    fn from_properties(
        position: usize,
        mut properties: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, PlanError> {
        let operator_id = match properties.remove(OPERATOR_ID) {
            Some(serde_json::Value::String(id)) => id,
            _ => {
                return Err(PlanError::Malformed(format!(
                    "operator {} has no string {}",
                    position, OPERATOR_ID
                )))
            }
        };
        let kind = decode_kind(&properties).map_err(|e| {
            let reason = e.to_string();
            let error = match offending_property(&properties, &reason) {
                Some(property) => PlanError::invalid(property, reason),
                None => PlanError::Malformed(reason),
            };
            error.in_operator(operator_id.as_str())
        })?;
        Ok(Self { operator_id, kind })
    }
}

fn decode_kind(
    properties: &serde_json::Map<String, serde_json::Value>,
) -> Result<OperatorKind, serde_json::Error> {
    serde_json::from_value(serde_json::Value::Object(properties.clone()))
}

/// The property a decode failure is about: the one it names as missing, or
/// the one whose removal makes the failure go away
fn offending_property(
    properties: &serde_json::Map<String, serde_json::Value>,
    reason: &str,
) -> Option<String> {
    if let Some(name) = missing_field(reason) {
        return Some(name.to_string());
    }
    properties.keys().find_map(|key| {
        let mut without = properties.clone();
        without.remove(key);
        let cleared = match decode_kind(&without) {
            Ok(_) => true,
            Err(e) => missing_field(&e.to_string()) == Some(key.as_str()),
        };
        cleared.then(|| key.clone())
    })
}

fn missing_field(reason: &str) -> Option<&str> {
    let rest = reason.strip_prefix("missing field `")?;
    rest.split('`').next()
}

/// Directed edge: `origin` feeds `destination`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub origin: String,
    pub destination: String,
}

impl Link {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

/// An attribute to project, by name or by input position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectionItem {
    Name(String),
    Field(ProjectedField),
}

/// Operator type and properties
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operatorType")]
pub enum OperatorKind {
    #[serde(rename_all = "camelCase")]
    ScanSource {
        index_name: String,
        #[serde(default)]
        payload: bool,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        offset: usize,
    },
    #[serde(rename_all = "camelCase")]
    KeywordSource {
        index_name: String,
        query: String,
        attributes: Vec<String>,
        matching_type: KeywordMatchingType,
        #[serde(default)]
        stop_words: bool,
    },
    #[serde(rename_all = "camelCase")]
    Values {
        attributes: Vec<Attribute>,
        #[serde(default)]
        rows: Vec<Vec<serde_json::Value>>,
    },
    #[serde(rename_all = "camelCase")]
    KeywordMatcher {
        query: String,
        attributes: Vec<String>,
        matching_type: KeywordMatchingType,
        #[serde(default)]
        stop_words: bool,
    },
    #[serde(rename_all = "camelCase")]
    FuzzyTokenMatcher {
        query: String,
        attributes: Vec<String>,
        threshold_ratio: f64,
        #[serde(default)]
        stop_words: bool,
    },
    #[serde(rename_all = "camelCase")]
    RegexMatcher {
        regex: String,
        attributes: Vec<String>,
        #[serde(default)]
        case_insensitive: bool,
    },
    #[serde(rename_all = "camelCase")]
    DictionaryMatcher {
        dictionary: Dictionary,
        attributes: Vec<String>,
        matching_type: KeywordMatchingType,
        #[serde(default)]
        stop_words: bool,
    },
    #[serde(rename_all = "camelCase")]
    NlpEntity {
        nlp_entity_type: NlpEntityType,
        attributes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Comparable {
        attribute: String,
        comparison_type: ComparisonType,
        compare_to: serde_json::Value,
    },
    Projection {
        attributes: Vec<ProjectionItem>,
    },
    Limit {
        limit: usize,
        #[serde(default)]
        offset: usize,
    },
    #[serde(rename_all = "camelCase")]
    Sort {
        sort_list: Vec<SortCriteria>,
    },
    #[serde(rename_all = "camelCase")]
    Aggregation {
        #[serde(default)]
        group_by: Vec<String>,
        aggregations: Vec<AggregateSpec>,
    },
    #[serde(rename_all = "camelCase")]
    Join {
        join_type: JoinType,
        inner_attribute: String,
        outer_attribute: String,
        #[serde(default)]
        similarity_threshold: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    ViewResults {
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        offset: usize,
        #[serde(default)]
        chart_type: Option<String>,
    },
    JsonLines {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl OperatorKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            OperatorKind::ScanSource { .. } => "ScanSource",
            OperatorKind::KeywordSource { .. } => "KeywordSource",
            OperatorKind::Values { .. } => "Values",
            OperatorKind::KeywordMatcher { .. } => "KeywordMatcher",
            OperatorKind::FuzzyTokenMatcher { .. } => "FuzzyTokenMatcher",
            OperatorKind::RegexMatcher { .. } => "RegexMatcher",
            OperatorKind::DictionaryMatcher { .. } => "DictionaryMatcher",
            OperatorKind::NlpEntity { .. } => "NlpEntity",
            OperatorKind::Comparable { .. } => "Comparable",
            OperatorKind::Projection { .. } => "Projection",
            OperatorKind::Limit { .. } => "Limit",
            OperatorKind::Sort { .. } => "Sort",
            OperatorKind::Aggregation { .. } => "Aggregation",
            OperatorKind::Join { .. } => "Join",
            OperatorKind::ViewResults { .. } => "ViewResults",
            OperatorKind::JsonLines { .. } => "JsonLines",
        }
    }

    /// Number of inputs the operator takes
    pub fn input_arity(&self) -> usize {
        match self {
            OperatorKind::ScanSource { .. }
            | OperatorKind::KeywordSource { .. }
            | OperatorKind::Values { .. } => 0,
            OperatorKind::Join { .. } => 2,
            _ => 1,
        }
    }

    pub fn is_sink(&self) -> bool {
        matches!(
            self,
            OperatorKind::ViewResults { .. } | OperatorKind::JsonLines { .. }
        )
    }
}

/// Resolved link structure of a validated plan
#[derive(Debug, Clone)]
pub struct PlanGraph {
    sink: String,
    inputs: HashMap<String, Vec<String>>,
}

impl PlanGraph {
    /// Id of the single sink
    pub fn sink(&self) -> &str {
        &self.sink
    }

    /// Inputs of an operator, in link order
    pub fn inputs(&self, operator: &str) -> &[String] {
        self.inputs.get(operator).map_or(&[], Vec::as_slice)
    }
}

/// Plan with operator properties not yet decoded
#[derive(Deserialize)]
struct RawPlan {
    operators: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    links: Vec<Link>,
}

const OPERATOR_ID: &str = "operatorId";

impl LogicalPlan {
    /// Parse a plan. An operator whose properties do not decode is reported
    /// by id, together with the offending property when it can be told.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let raw: RawPlan =
            serde_json::from_str(json).map_err(|e| PlanError::Malformed(e.to_string()))?;
        let operators = raw
            .operators
            .into_iter()
            .enumerate()
            .map(|(position, properties)| OperatorDescription::from_properties(position, properties))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            operators,
            links: raw.links,
        })
    }

    pub fn operator(&self, id: &str) -> Option<&OperatorDescription> {
        self.operators.iter().find(|o| o.operator_id == id)
    }

    /// Check the link structure without instantiating anything.
    ///
    /// Every link must name known operators, each operator must have exactly
    /// as many inputs as its type takes and feed at most one consumer, there
    /// must be exactly one sink, and every operator must reach it without
    /// running into a cycle.
    pub fn validate(&self) -> Result<PlanGraph, PlanError> {
        let mut kinds: HashMap<&str, &OperatorKind> = HashMap::new();
        for operator in &self.operators {
            if kinds.insert(&operator.operator_id, &operator.kind).is_some() {
                return Err(PlanError::DuplicateOperator(operator.operator_id.clone()));
            }
        }

        let mut inputs: HashMap<String, Vec<String>> = HashMap::new();
        let mut consumer: HashMap<&str, &str> = HashMap::new();
        let mut consumers: HashMap<&str, usize> = HashMap::new();
        for link in &self.links {
            for end in [&link.origin, &link.destination] {
                if !kinds.contains_key(end.as_str()) {
                    return Err(PlanError::UnresolvedLink {
                        origin: link.origin.clone(),
                        destination: link.destination.clone(),
                        missing: end.clone(),
                    });
                }
            }
            inputs
                .entry(link.destination.clone())
                .or_default()
                .push(link.origin.clone());
            consumer.insert(&link.origin, &link.destination);
            *consumers.entry(&link.origin).or_default() += 1;
        }

        for operator in &self.operators {
            let id = operator.operator_id.as_str();
            let fed = consumers.get(id).copied().unwrap_or(0);
            if fed > 1 {
                return Err(PlanError::FanOut { consumers: fed }.in_operator(id));
            }
            if operator.kind.is_sink() && fed > 0 {
                return Err(PlanError::Malformed(format!(
                    "sink '{}' cannot feed another operator",
                    id
                )));
            }
            let actual = inputs.get(id).map_or(0, Vec::len);
            let expected = operator.kind.input_arity();
            if actual != expected {
                return Err(PlanError::InputArity { expected, actual }.in_operator(id));
            }
        }

        let sinks: Vec<&str> = self
            .operators
            .iter()
            .filter(|o| o.kind.is_sink())
            .map(|o| o.operator_id.as_str())
            .collect();
        let [sink] = sinks.as_slice() else {
            return Err(PlanError::SinkCount(sinks.len()));
        };

        // Each operator has at most one consumer, so following consumers from
        // any operator traces a single path, which must end at the sink
        for operator in &self.operators {
            let mut on_path = HashSet::new();
            let mut current = operator.operator_id.as_str();
            while let Some(&next) = consumer.get(current) {
                if !on_path.insert(current) {
                    return Err(PlanError::Cycle(current.to_string()));
                }
                current = next;
            }
            if current != *sink {
                return Err(PlanError::Malformed(format!(
                    "operator '{}' does not lead to the sink",
                    operator.operator_id
                )));
            }
        }

        Ok(PlanGraph {
            sink: sink.to_string(),
            inputs,
        })
    }
}
