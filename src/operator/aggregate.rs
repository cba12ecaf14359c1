//! Hash aggregation, global or grouped.
//!
//! - COUNT works on any attribute (counting non-NULL values) or on no
//!   attribute at all (counting tuples) and yields a LONG.
//! - SUM yields LONG over INTEGER/LONG input and DOUBLE over DOUBLE input.
//! - AVERAGE yields a DOUBLE; MIN and MAX keep the input type.
//! - CONCAT joins the non-NULL values' text with `,` into a STRING.
//!
//! SUM, AVERAGE, MIN and MAX reject non-numeric attributes when the operator
//! is built. NULL inputs are ignored; a function that saw no value yields
//! NULL, except COUNT which yields 0. A global aggregation over empty input
//! still produces one tuple. Groups are emitted in the order their key was
//! first seen.

use crate::data::{Attribute, AttributeType, Schema, Tuple, Value, ValueKey};
use crate::error::{DataError, EngineError, EngineResult, PlanError};
use crate::operator::{close_after_failure, close_children, BoxedOperator, Lifecycle, Operator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::vec;

const CONCAT_SEPARATOR: &str = ",";

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Sum,
    Count,
    Average,
    Min,
    Max,
    Concat,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 6] = [
        AggregateFunction::Sum,
        AggregateFunction::Count,
        AggregateFunction::Average,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::Concat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Count => "count",
            AggregateFunction::Average => "average",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Concat => "concat",
        }
    }

    /// Output type for an input attribute type, or an error if the function
    /// does not apply to it
    pub fn output_type(
        &self,
        attribute: Option<&Attribute>,
    ) -> Result<AttributeType, PlanError> {
        let Some(attribute) = attribute else {
            return match self {
                AggregateFunction::Count => Ok(AttributeType::Long),
                _ => Err(PlanError::MissingProperty {
                    property: "attribute".to_string(),
                }),
            };
        };

        let input = attribute.attribute_type();
        let unsupported = || PlanError::UnsupportedAggregate {
            function: self.as_str(),
            attribute: attribute.name().to_string(),
            attribute_type: input,
        };
        match self {
            AggregateFunction::Count => Ok(AttributeType::Long),
            AggregateFunction::Concat => Ok(AttributeType::String),
            _ if !input.is_numeric() => Err(unsupported()),
            AggregateFunction::Sum if input == AttributeType::Double => Ok(AttributeType::Double),
            AggregateFunction::Sum => Ok(AttributeType::Long),
            AggregateFunction::Average => Ok(AttributeType::Double),
            AggregateFunction::Min | AggregateFunction::Max => Ok(input),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateFunction {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateFunction::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| PlanError::UnknownToken {
                vocabulary: "aggregation function",
                value: s.to_string(),
            })
    }
}

/// Specification for one aggregate output attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSpec {
    pub function: AggregateFunction,
    /// Input attribute; `None` only for a COUNT of tuples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Name of the output attribute
    pub result_attribute: String,
}

impl AggregateSpec {
    pub fn new(
        function: AggregateFunction,
        attribute: impl Into<String>,
        result_attribute: impl Into<String>,
    ) -> Self {
        Self {
            function,
            attribute: Some(attribute.into()),
            result_attribute: result_attribute.into(),
        }
    }

    /// COUNT over tuples rather than over one attribute
    pub fn count_tuples(result_attribute: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Count,
            attribute: None,
            result_attribute: result_attribute.into(),
        }
    }
}

/// Running state of one aggregate within one group
#[derive(Debug, Clone)]
enum AggregateState {
    Count(i64),
    SumLong(Option<i64>),
    SumDouble(Option<f64>),
    Average { sum: f64, count: i64 },
    Extreme(Option<Value>),
    Concat(Vec<String>),
}

impl AggregateState {
    fn new(function: AggregateFunction, output: AttributeType) -> Self {
        match function {
            AggregateFunction::Count => AggregateState::Count(0),
            AggregateFunction::Sum if output == AttributeType::Double => {
                AggregateState::SumDouble(None)
            }
            AggregateFunction::Sum => AggregateState::SumLong(None),
            AggregateFunction::Average => AggregateState::Average { sum: 0.0, count: 0 },
            AggregateFunction::Min | AggregateFunction::Max => AggregateState::Extreme(None),
            AggregateFunction::Concat => AggregateState::Concat(Vec::new()),
        }
    }

    /// Fold one input value in. `value` is `None` for a COUNT of tuples.
    fn update(
        &mut self,
        function: AggregateFunction,
        attribute: &str,
        value: Option<&Value>,
    ) -> Result<(), DataError> {
        let value = match value {
            None => {
                if let AggregateState::Count(n) = self {
                    *n += 1;
                }
                return Ok(());
            }
            Some(Value::Null) => return Ok(()),
            Some(value) => value,
        };

        match self {
            AggregateState::Count(n) => *n += 1,
            AggregateState::SumLong(sum) => {
                let n = match value {
                    Value::Integer(i) => i64::from(*i),
                    Value::Long(l) => *l,
                    other => {
                        return Err(DataError::FieldType {
                            attribute: attribute.to_string(),
                            expected: AttributeType::Long,
                            actual: other.type_name(),
                        })
                    }
                };
                let total = sum.unwrap_or(0).checked_add(n).ok_or_else(|| {
                    DataError::MalformedValue {
                        attribute: attribute.to_string(),
                        reason: "sum overflows a long".to_string(),
                    }
                })?;
                *sum = Some(total);
            }
            AggregateState::SumDouble(sum) => {
                *sum = Some(sum.unwrap_or(0.0) + Self::numeric(attribute, value)?);
            }
            AggregateState::Average { sum, count } => {
                *sum += Self::numeric(attribute, value)?;
                *count += 1;
            }
            AggregateState::Extreme(current) => {
                let replace = match current {
                    None => true,
                    Some(current) => {
                        let ordering = value.compare(current)?;
                        match function {
                            AggregateFunction::Min => ordering.is_lt(),
                            _ => ordering.is_gt(),
                        }
                    }
                };
                if replace {
                    *current = Some(value.clone());
                }
            }
            AggregateState::Concat(parts) => parts.push(value.to_string()),
        }
        Ok(())
    }

    fn numeric(attribute: &str, value: &Value) -> Result<f64, DataError> {
        value.as_f64().ok_or_else(|| DataError::FieldType {
            attribute: attribute.to_string(),
            expected: AttributeType::Double,
            actual: value.type_name(),
        })
    }

    fn finalize(&self) -> Value {
        match self {
            AggregateState::Count(n) => Value::Long(*n),
            AggregateState::SumLong(sum) => sum.map_or(Value::Null, Value::Long),
            AggregateState::SumDouble(sum) => sum.map_or(Value::Null, Value::Double),
            AggregateState::Average { count: 0, .. } => Value::Null,
            AggregateState::Average { sum, count } => Value::Double(*sum / *count as f64),
            AggregateState::Extreme(value) => value.clone().unwrap_or(Value::Null),
            AggregateState::Concat(parts) if parts.is_empty() => Value::Null,
            AggregateState::Concat(parts) => Value::String(parts.join(CONCAT_SEPARATOR)),
        }
    }
}

/// An aggregate spec resolved against the input schema
#[derive(Debug, Clone)]
struct BoundAggregate {
    function: AggregateFunction,
    position: Option<usize>,
    attribute: String,
    output: AttributeType,
}

/// Hash aggregation operator
pub struct Aggregator {
    lifecycle: Lifecycle,
    /// Child operator providing input tuples
    child: BoxedOperator,
    /// Positions of the group-by attributes
    group_by: Vec<usize>,
    /// Aggregates to compute, in output order
    aggregates: Vec<BoundAggregate>,
    output_schema: Arc<Schema>,
    /// Result tuples, produced when the operator opens
    results: vec::IntoIter<Tuple>,
}

impl Aggregator {
    pub fn new(
        child: BoxedOperator,
        group_by: Vec<String>,
        aggregates: Vec<AggregateSpec>,
    ) -> Result<Self, PlanError> {
        if aggregates.is_empty() {
            return Err(PlanError::invalid(
                "aggregations",
                "at least one aggregate function is required",
            ));
        }

        let input = child.output_schema().clone();
        let mut attributes = Vec::with_capacity(group_by.len() + aggregates.len());

        let group_by = group_by
            .iter()
            .map(|name| {
                let position = input.position(name)?;
                attributes.push(input.attributes()[position].clone());
                Ok(position)
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        let aggregates = aggregates
            .into_iter()
            .map(|spec| {
                let position = spec
                    .attribute
                    .as_deref()
                    .map(|name| input.position(name))
                    .transpose()?;
                let attribute = position.map(|p| &input.attributes()[p]);
                let output = spec.function.output_type(attribute)?;
                attributes.push(Attribute::new(spec.result_attribute.clone(), output));
                Ok(BoundAggregate {
                    function: spec.function,
                    position,
                    attribute: spec.attribute.unwrap_or_else(|| "*".to_string()),
                    output,
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        Ok(Self {
            lifecycle: Lifecycle::new("aggregate"),
            child,
            group_by,
            aggregates,
            output_schema: Arc::new(Schema::new(attributes)?),
            results: Vec::new().into_iter(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    fn fresh_states(&self) -> Vec<AggregateState> {
        self.aggregates
            .iter()
            .map(|a| AggregateState::new(a.function, a.output))
            .collect()
    }

    /// Drain the child and compute one result tuple per group
    fn consume_input(&mut self) -> EngineResult<Vec<Tuple>> {
        let mut groups: Vec<(Vec<Value>, Vec<AggregateState>)> = Vec::new();
        let mut index: HashMap<ValueKey, usize> = HashMap::new();

        while let Some(tuple) = self.child.next_tuple()? {
            let key: Vec<Value> = self
                .group_by
                .iter()
                .map(|&p| tuple.fields()[p].clone())
                .collect();
            let slot = match index.get(&ValueKey(key.clone())) {
                Some(&slot) => slot,
                None => {
                    index.insert(ValueKey(key.clone()), groups.len());
                    groups.push((key, self.fresh_states()));
                    groups.len() - 1
                }
            };

            let states = &mut groups[slot].1;
            for (state, aggregate) in states.iter_mut().zip(&self.aggregates) {
                let value = aggregate.position.map(|p| &tuple.fields()[p]);
                state.update(aggregate.function, &aggregate.attribute, value)?;
            }
        }

        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Vec::new(), self.fresh_states()));
        }

        log::debug!(
            "aggregate '{}' produced {} groups",
            self.lifecycle.id(),
            groups.len()
        );

        groups
            .into_iter()
            .map(|(mut key, states)| {
                key.extend(states.iter().map(AggregateState::finalize));
                Tuple::new(self.output_schema.clone(), key).map_err(EngineError::from)
            })
            .collect()
    }
}

impl Operator for Aggregator {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;

        match self.consume_input() {
            Ok(results) => self.results = results.into_iter(),
            Err(e) => {
                close_after_failure(&mut self.child);
                return Err(self.lifecycle.wrap(e));
            }
        }
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        Ok(self.results.next())
    }

    fn close(&mut self) -> EngineResult<()> {
        if self.lifecycle.mark_closed() {
            self.results = Vec::new().into_iter();
        }
        close_children(&mut [&mut self.child]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}
