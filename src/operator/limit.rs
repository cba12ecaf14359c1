//! Limit operator.
//!
//! Skips `offset` tuples from its child, then passes at most `limit` tuples
//! through. Once the limit is reached the child is no longer pulled.

use crate::data::{Schema, Tuple};
use crate::error::EngineResult;
use crate::operator::{close_children, BoxedOperator, Lifecycle, Operator};
use std::sync::Arc;

/// Operator that limits the number of tuples returned
pub struct Limit {
    lifecycle: Lifecycle,
    /// Child operator that produces tuples
    child: BoxedOperator,
    /// Maximum number of tuples to return
    limit: usize,
    /// Number of tuples to skip before returning
    offset: usize,
    /// Number of tuples skipped so far
    skipped: usize,
    /// Number of tuples returned so far
    returned: usize,
}

impl Limit {
    pub fn new(child: BoxedOperator, limit: usize) -> Self {
        Self::with_offset(child, limit, 0)
    }

    pub fn with_offset(child: BoxedOperator, limit: usize, offset: usize) -> Self {
        Self {
            lifecycle: Lifecycle::new("limit"),
            child,
            limit,
            offset,
            skipped: 0,
            returned: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }
}

impl Operator for Limit {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;
        self.skipped = 0;
        self.returned = 0;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;

        if self.returned >= self.limit {
            return Ok(None);
        }

        while self.skipped < self.offset {
            match self.child.next_tuple().map_err(|e| self.lifecycle.wrap(e))? {
                Some(_) => self.skipped += 1,
                None => return Ok(None),
            }
        }

        let tuple = self.child.next_tuple().map_err(|e| self.lifecycle.wrap(e))?;
        if tuple.is_some() {
            self.returned += 1;
        }
        Ok(tuple)
    }

    fn close(&mut self) -> EngineResult<()> {
        self.lifecycle.mark_closed();
        close_children(&mut [&mut self.child]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        self.child.output_schema()
    }
}
