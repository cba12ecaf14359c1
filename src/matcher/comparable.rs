//! Range predicates over orderable attribute values.

use crate::data::{Schema, Span, Tuple, Value};
use crate::error::{EngineResult, PlanError};
use crate::matcher::Matcher;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonType {
    #[serde(rename = "=")]
    EqualTo,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqualTo,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqualTo,
    #[serde(rename = "!=")]
    NotEqualTo,
}

impl ComparisonType {
    pub const ALL: [ComparisonType; 6] = [
        ComparisonType::EqualTo,
        ComparisonType::GreaterThan,
        ComparisonType::GreaterThanOrEqualTo,
        ComparisonType::LessThan,
        ComparisonType::LessThanOrEqualTo,
        ComparisonType::NotEqualTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonType::EqualTo => "=",
            ComparisonType::GreaterThan => ">",
            ComparisonType::GreaterThanOrEqualTo => ">=",
            ComparisonType::LessThan => "<",
            ComparisonType::LessThanOrEqualTo => "<=",
            ComparisonType::NotEqualTo => "!=",
        }
    }

    /// Whether `value.cmp(threshold) == ordering` satisfies this comparison
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonType::EqualTo => ordering == Ordering::Equal,
            ComparisonType::GreaterThan => ordering == Ordering::Greater,
            ComparisonType::GreaterThanOrEqualTo => ordering != Ordering::Less,
            ComparisonType::LessThan => ordering == Ordering::Less,
            ComparisonType::LessThanOrEqualTo => ordering != Ordering::Greater,
            ComparisonType::NotEqualTo => ordering != Ordering::Equal,
        }
    }

    pub fn apply<T: Ord + ?Sized>(&self, value: &T, threshold: &T) -> bool {
        self.holds(value.cmp(threshold))
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| PlanError::UnknownToken {
                vocabulary: "comparison type",
                value: s.to_string(),
            })
    }
}

/// `attribute <comparison> threshold`.
///
/// NULL fields never match. A field whose type differs from the threshold's
/// is a data error; values are never coerced.
pub struct ComparablePredicate {
    attribute: String,
    comparison: ComparisonType,
    threshold: Value,
    position: Option<usize>,
}

impl ComparablePredicate {
    pub fn new(
        attribute: impl Into<String>,
        comparison: ComparisonType,
        threshold: Value,
    ) -> Result<Self, PlanError> {
        if threshold.is_null() {
            return Err(PlanError::invalid("compareTo", "threshold must not be null"));
        }
        Ok(Self {
            attribute: attribute.into(),
            comparison,
            threshold,
            position: None,
        })
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn comparison(&self) -> ComparisonType {
        self.comparison
    }

    pub fn threshold(&self) -> &Value {
        &self.threshold
    }
}

impl Matcher for ComparablePredicate {
    fn name(&self) -> &'static str {
        "comparable"
    }

    fn produces_spans(&self) -> bool {
        false
    }

    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.position = Some(schema.position(&self.attribute)?);
        Ok(())
    }

    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>> {
        let value = match self.position.and_then(|p| tuple.get(p)) {
            Some(value) if !value.is_null() => value,
            _ => return Ok(None),
        };
        let ordering = value.compare(&self.threshold)?;
        Ok(self.comparison.holds(ordering).then(Vec::new))
    }
}
