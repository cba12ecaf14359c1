//! Projection operator.
//!
//! Selects input positions in a given order. A position may be selected more
//! than once as long as every copy ends up under a distinct name.

use crate::data::{Attribute, Schema, Tuple};
use crate::error::{EngineResult, PlanError};
use crate::operator::{close_children, BoxedOperator, Lifecycle, Operator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One output column: an input position and an optional new name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedField {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ProjectedField {
    pub fn new(index: usize) -> Self {
        Self { index, alias: None }
    }

    pub fn aliased(index: usize, alias: impl Into<String>) -> Self {
        Self {
            index,
            alias: Some(alias.into()),
        }
    }
}

pub struct Projection {
    lifecycle: Lifecycle,
    child: BoxedOperator,
    fields: Vec<ProjectedField>,
    output_schema: Arc<Schema>,
}

impl Projection {
    pub fn new(child: BoxedOperator, fields: Vec<ProjectedField>) -> Result<Self, PlanError> {
        if fields.is_empty() {
            return Err(PlanError::invalid("attributes", "at least one attribute is required"));
        }

        let input = child.output_schema();
        let attributes = fields
            .iter()
            .map(|field| {
                let attribute = input.attributes().get(field.index).ok_or(
                    PlanError::IndexOutOfBounds {
                        index: field.index,
                        len: input.len(),
                    },
                )?;
                Ok(match &field.alias {
                    Some(alias) => Attribute::new(alias.clone(), attribute.attribute_type()),
                    None => attribute.clone(),
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        Ok(Self {
            lifecycle: Lifecycle::new("projection"),
            output_schema: Arc::new(Schema::new(attributes)?),
            child,
            fields,
        })
    }

    /// Project the named attributes, in order
    pub fn by_name(child: BoxedOperator, names: &[&str]) -> Result<Self, PlanError> {
        let fields = names
            .iter()
            .map(|name| child.output_schema().position(name).map(ProjectedField::new))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(child, fields)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }
}

impl Operator for Projection {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;

        let Some(tuple) = self.child.next_tuple().map_err(|e| self.lifecycle.wrap(e))? else {
            return Ok(None);
        };

        // Input positions were validated at construction
        let values = self
            .fields
            .iter()
            .map(|field| tuple.fields()[field.index].clone())
            .collect();
        Tuple::new(self.output_schema.clone(), values)
            .map(Some)
            .map_err(|e| self.lifecycle.wrap(e.into()))
    }

    fn close(&mut self) -> EngineResult<()> {
        self.lifecycle.mark_closed();
        close_children(&mut [&mut self.child]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}
