//! Operator layer for plan execution.
//!
//! Operators follow the pull-based iterator model: a consumer opens its
//! child, repeatedly asks it for the next tuple until it reports exhaustion,
//! then closes it. Each operator is both a consumer of its children and a
//! producer for its parent.
//!
//! - `open()` opens every child before acquiring local resources. If any step
//!   fails, whatever was already opened is closed again before returning.
//! - `next_tuple()` is only legal while open and returns `Ok(None)` on
//!   exhaustion.
//! - `close()` releases local resources, then closes the children. It is a
//!   no-op for anything already closed, so it may be called repeatedly and
//!   after a failed open.
//! - `output_schema()` is fixed at construction.

use crate::data::{Schema, Tuple};
use crate::error::{DataError, EngineError, EngineResult};
use std::sync::Arc;

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod limit;
pub mod projection;
pub mod scan;
pub mod sink;
pub mod sort;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{AggregateFunction, AggregateSpec, Aggregator};
pub use filter::MatchFilter;
pub use join::{EqualityJoinPredicate, Join, JoinPredicate, JoinType, SimilarityJoinPredicate};
pub use limit::Limit;
pub use projection::{ProjectedField, Projection};
pub use scan::{KeywordSource, ScanSource};
pub use sink::{BoxedSink, JsonLinesSink, Sink, TupleSink};
pub use sort::{Sort, SortCriteria, SortOrder};
pub use source::TupleSource;

/// Trait for all plan operators
pub trait Operator: Send {
    /// Identity used in logs and in error chains
    fn id(&self) -> &str;

    /// Open the operator and, before anything local, its children
    fn open(&mut self) -> EngineResult<()>;

    /// Get the next tuple. Returns `None` when there are no more tuples.
    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>>;

    /// Release local resources and close the children
    fn close(&mut self) -> EngineResult<()>;

    /// Schema of every tuple this operator produces
    fn output_schema(&self) -> &Arc<Schema>;
}

pub type BoxedOperator = Box<dyn Operator>;

/// Protocol state of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Closed,
    Opened,
}

/// Per-operator bookkeeping of identity and protocol state
#[derive(Debug, Clone)]
pub struct Lifecycle {
    id: String,
    state: OperatorState,
}

impl Lifecycle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: OperatorState::Closed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == OperatorState::Opened
    }

    /// Fails if the operator is already open
    pub fn check_closed(&self) -> EngineResult<()> {
        if self.is_open() {
            return Err(self.wrap(DataError::AlreadyOpen.into()));
        }
        Ok(())
    }

    /// Fails unless the operator is open
    pub fn check_open(&self) -> EngineResult<()> {
        if !self.is_open() {
            return Err(self.wrap(DataError::NotOpen.into()));
        }
        Ok(())
    }

    pub fn mark_opened(&mut self) {
        log::debug!("opened operator '{}'", self.id);
        self.state = OperatorState::Opened;
    }

    /// Mark closed, returning whether the operator was open
    pub fn mark_closed(&mut self) -> bool {
        let was_open = self.is_open();
        if was_open {
            log::debug!("closed operator '{}'", self.id);
        }
        self.state = OperatorState::Closed;
        was_open
    }

    /// Attach this operator's identity to an error leaving it
    pub fn wrap(&self, error: EngineError) -> EngineError {
        error.in_operator(self.id.clone())
    }
}

/// Open `children` in order. If one fails, the children opened before it
/// are closed again and the original error is returned.
pub fn open_children(children: &mut [&mut BoxedOperator]) -> EngineResult<()> {
    for index in 0..children.len() {
        if let Err(error) = children[index].open() {
            for opened in children[..index].iter_mut().rev() {
                close_after_failure(opened);
            }
            return Err(error);
        }
    }
    Ok(())
}

/// Close an operator whose parent failed to open. A second failure is only
/// logged, so the original error is the one reported.
pub fn close_after_failure(operator: &mut BoxedOperator) {
    if let Err(cleanup) = operator.close() {
        log::warn!(
            "closing '{}' after a failed open also failed: {}",
            operator.id(),
            cleanup
        );
    }
}

/// Close every child, even if an earlier one fails; the first error wins
pub fn close_children(children: &mut [&mut BoxedOperator]) -> EngineResult<()> {
    let mut first_error = None;
    for child in children.iter_mut() {
        if let Err(error) = child.close() {
            log::warn!("closing '{}' failed: {}", child.id(), error);
            first_error.get_or_insert(error);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Drain an operator that is already open into a vector
pub fn collect_tuples(operator: &mut dyn Operator) -> EngineResult<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while let Some(tuple) = operator.next_tuple()? {
        tuples.push(tuple);
    }
    Ok(tuples)
}
