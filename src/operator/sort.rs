//! Sort operator.
//!
//! Materializes every tuple from its child when opened, then returns them
//! ordered by the criteria, compared lexicographically in listed order.
//! The sort is stable: tuples equal on every criterion keep their input
//! order. NULLs come first in ascending order and last in descending order.

use crate::data::{Schema, Tuple, Value};
use crate::error::{EngineResult, PlanError};
use crate::operator::{close_after_failure, close_children, collect_tuples, BoxedOperator, Lifecycle, Operator};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::vec;

/// Sort order for an attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(PlanError::UnknownToken {
                vocabulary: "sort order",
                value: s.to_string(),
            }),
        }
    }
}

/// Sort criteria for a single attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriteria {
    pub attribute: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortCriteria {
    pub fn new(attribute: impl Into<String>, order: SortOrder) -> Self {
        Self {
            attribute: attribute.into(),
            order,
        }
    }

    pub fn asc(attribute: impl Into<String>) -> Self {
        Self::new(attribute, SortOrder::Asc)
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self::new(attribute, SortOrder::Desc)
    }
}

/// Operator that sorts tuples based on multiple criteria
pub struct Sort {
    lifecycle: Lifecycle,
    /// Child operator that produces tuples
    child: BoxedOperator,
    /// Resolved (position, order) pairs in order of precedence
    keys: Vec<(usize, SortOrder)>,
    /// Materialized and sorted tuples
    sorted: vec::IntoIter<Tuple>,
}

impl Sort {
    pub fn new(child: BoxedOperator, criteria: Vec<SortCriteria>) -> Result<Self, PlanError> {
        if criteria.is_empty() {
            return Err(PlanError::invalid("sortList", "at least one criterion is required"));
        }
        let keys = criteria
            .iter()
            .map(|c| Ok((child.output_schema().position(&c.attribute)?, c.order)))
            .collect::<Result<Vec<_>, PlanError>>()?;

        Ok(Self {
            lifecycle: Lifecycle::new("sort"),
            child,
            keys,
            sorted: Vec::new().into_iter(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    fn compare(keys: &[(usize, SortOrder)], a: &Tuple, b: &Tuple) -> Ordering {
        for &(position, order) in keys {
            let (left, right) = (&a.fields()[position], &b.fields()[position]);
            let ordering = order.apply(Value::sort_cmp(left, right));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn materialize(&mut self) -> EngineResult<()> {
        let mut tuples = collect_tuples(&mut *self.child)?;
        let keys = &self.keys;
        tuples.sort_by(|a, b| Self::compare(keys, a, b));
        log::debug!("sort '{}' materialized {} tuples", self.lifecycle.id(), tuples.len());
        self.sorted = tuples.into_iter();
        Ok(())
    }
}

impl Operator for Sort {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;

        if let Err(e) = self.materialize() {
            self.sorted = Vec::new().into_iter();
            close_after_failure(&mut self.child);
            return Err(self.lifecycle.wrap(e));
        }
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        Ok(self.sorted.next())
    }

    fn close(&mut self) -> EngineResult<()> {
        if self.lifecycle.mark_closed() {
            self.sorted = Vec::new().into_iter();
        }
        close_children(&mut [&mut self.child]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        self.child.output_schema()
    }
}
