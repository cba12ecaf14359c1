//! Plans: description, construction and evaluation.
//!
//! A [`LogicalPlan`] is parsed from JSON and validated, the [`PlanBuilder`]
//! turns it into a tree of operators rooted at a sink, and [`evaluate`]
//! drives that tree to completion.

pub mod builder;
pub mod driver;
pub mod logical;
pub mod options;

pub use builder::PlanBuilder;
pub use driver::{evaluate, EvaluationSummary};
pub use logical::{Link, LogicalPlan, OperatorDescription, OperatorKind, PlanGraph, ProjectionItem};
pub use options::{describe, OptionDescriptor, OPERATOR_TYPES};

use crate::data::{Schema, Tuple};
use crate::index::IndexCatalog;
use crate::matcher::{LexiconTagger, Tagger};
use crate::operator::BoxedSink;
use std::sync::Arc;

/// Services available while operators are constructed
#[derive(Clone)]
pub struct ExecutionContext {
    pub catalog: Arc<IndexCatalog>,
    pub tagger: Arc<dyn Tagger>,
}

impl ExecutionContext {
    /// Context using the built-in lexicon tagger
    pub fn new(catalog: Arc<IndexCatalog>) -> Self {
        Self {
            catalog,
            tagger: Arc::new(LexiconTagger::new()),
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = tagger;
        self
    }
}

/// An operator tree ready to be evaluated
pub struct Plan {
    sink: BoxedSink,
}

impl Plan {
    pub fn new(sink: BoxedSink) -> Self {
        Self { sink }
    }

    pub fn sink_id(&self) -> &str {
        self.sink.id()
    }

    pub fn output_schema(&self) -> &Arc<Schema> {
        self.sink.output_schema()
    }

    /// Results kept by an in-memory sink after evaluation
    pub fn take_results(&mut self) -> Vec<Tuple> {
        self.sink.take_results()
    }

    pub(crate) fn sink_mut(&mut self) -> &mut BoxedSink {
        &mut self.sink
    }
}
