//! Literal-row source.
//!
//! Rows are checked against the declared schema when the source is built and
//! emitted verbatim, in order, without a synthesized `_id`.

use crate::data::{Schema, Tuple, Value};
use crate::error::{EngineResult, PlanError};
use crate::operator::{Lifecycle, Operator};
use std::sync::Arc;

/// Source producing a fixed list of tuples
pub struct TupleSource {
    lifecycle: Lifecycle,
    /// Validated tuples, emitted in order
    tuples: Vec<Tuple>,
    schema: Arc<Schema>,
    /// Index of the next tuple to emit
    cursor: usize,
}

impl TupleSource {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self, PlanError> {
        let schema = Arc::new(schema);
        let tuples = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Tuple::new(schema.clone(), row)
                    .map_err(|e| PlanError::invalid("rows", format!("row {}: {}", i, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            lifecycle: Lifecycle::new("values"),
            tuples,
            schema,
            cursor: 0,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }
}

impl Operator for TupleSource {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.cursor = 0;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        let tuple = self.tuples.get(self.cursor).cloned();
        if tuple.is_some() {
            self.cursor += 1;
        }
        Ok(tuple)
    }

    fn close(&mut self) -> EngineResult<()> {
        self.lifecycle.mark_closed();
        Ok(())
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
