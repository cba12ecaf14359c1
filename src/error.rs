//! Error taxonomy for plan construction and evaluation.
//!
//! Three kinds of failure are kept apart:
//!
//! - [`PlanError`]: raised while a plan is described, validated or its
//!   operators are constructed. Nothing has been opened yet.
//! - [`DataError`]: raised while tuples flow (malformed values, tagger
//!   failures, protocol misuse).
//! - [`StorageError`]: the narrower runtime kind for index and dictionary
//!   reads, classified as transient or structural.
//!
//! Operator calls return [`EngineError`], which carries one of the three and
//! the chain of operators the failure travelled through.

use crate::data::AttributeType;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors detected before any operator is opened.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("duplicate attribute '{name}' in schema")]
    DuplicateAttribute { name: String },

    #[error("attribute '{name}' not found in schema")]
    AttributeNotFound { name: String },

    #[error("attribute '{attribute}' has type {actual}, expected {expected}")]
    AttributeTypeMismatch {
        attribute: String,
        expected: String,
        actual: AttributeType,
    },

    #[error("schema already contains reserved attribute '{name}'")]
    ReservedAttributePresent { name: String },

    #[error("index {index} is out of bounds for schema with {len} attributes")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("join attributes disagree: inner '{inner}' is {inner_type}, outer '{outer}' is {outer_type}")]
    JoinTypeMismatch {
        inner: String,
        inner_type: AttributeType,
        outer: String,
        outer_type: AttributeType,
    },

    #[error("aggregate {function} cannot be applied to '{attribute}' of type {attribute_type}")]
    UnsupportedAggregate {
        function: &'static str,
        attribute: String,
        attribute_type: AttributeType,
    },

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown {vocabulary} '{value}'")]
    UnknownToken {
        vocabulary: &'static str,
        value: String,
    },

    #[error("missing property '{property}'")]
    MissingProperty { property: String },

    #[error("invalid property '{property}': {reason}")]
    InvalidProperty { property: String, reason: String },

    #[error("duplicate operator id '{0}'")]
    DuplicateOperator(String),

    #[error("link {origin} -> {destination} references unknown operator '{missing}'")]
    UnresolvedLink {
        origin: String,
        destination: String,
        missing: String,
    },

    #[error("operator expects {expected} input(s), found {actual}")]
    InputArity { expected: usize, actual: usize },

    #[error("output feeds {consumers} consumers; only one is allowed")]
    FanOut { consumers: usize },

    #[error("plan contains a cycle through operator '{0}'")]
    Cycle(String),

    #[error("plan must contain exactly one sink, found {0}")]
    SinkCount(usize),

    #[error("index '{0}' is not registered")]
    UnknownIndex(String),

    #[error("malformed plan: {0}")]
    Malformed(String),

    #[error("operator '{operator}': {source}")]
    InOperator {
        operator: String,
        #[source]
        source: Box<PlanError>,
    },
}

impl PlanError {
    /// Attach the identity of the operator whose construction failed.
    pub fn in_operator(self, operator: impl Into<String>) -> Self {
        PlanError::InOperator {
            operator: operator.into(),
            source: Box::new(self),
        }
    }

    /// The operator id this error was attributed to, if any.
    pub fn operator(&self) -> Option<&str> {
        match self {
            PlanError::InOperator { operator, .. } => Some(operator),
            _ => None,
        }
    }

    /// The innermost error, with operator attribution stripped.
    pub fn root(&self) -> &PlanError {
        match self {
            PlanError::InOperator { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn invalid(property: impl Into<String>, reason: impl fmt::Display) -> Self {
        PlanError::InvalidProperty {
            property: property.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while tuples are flowing.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("tuple has {actual} fields but schema has {expected} attributes")]
    FieldCount { expected: usize, actual: usize },

    #[error("field '{attribute}' expects {expected}, got {actual}")]
    FieldType {
        attribute: String,
        expected: AttributeType,
        actual: &'static str,
    },

    #[error("attribute '{0}' is not part of the tuple")]
    UnknownAttribute(String),

    #[error("cannot compare {left} with {right}")]
    Incomparable {
        left: &'static str,
        right: &'static str,
    },

    #[error("malformed value for '{attribute}': {reason}")]
    MalformedValue { attribute: String, reason: String },

    #[error("tagger failed: {0}")]
    Tagger(String),

    #[error("operator is not open")]
    NotOpen,

    #[error("operator is already open")]
    AlreadyOpen,
}

/// Errors reading or writing index and dictionary data.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("malformed document file {path}: {reason}")]
    Documents { path: PathBuf, reason: String },

    #[error("index '{0}' reader is closed")]
    ReaderClosed(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            StorageError::Codec { .. }
            | StorageError::Documents { .. }
            | StorageError::ReaderClosed(_) => false,
        }
    }
}

/// Which of the three error kinds a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Plan,
    Data,
    Storage,
}

/// Error returned by operator calls and by plan evaluation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("operator '{operator}' failed: {source}")]
    Operator {
        operator: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Wrap this error with the identity of the operator it passed through.
    pub fn in_operator(self, operator: impl Into<String>) -> Self {
        EngineError::Operator {
            operator: operator.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with every operator wrapper stripped.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Operator { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            EngineError::Plan(_) => ErrorKind::Plan,
            EngineError::Data(_) => ErrorKind::Data,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Operator { .. } => unreachable!("root() strips operator wrappers"),
        }
    }

    /// Operator ids from the outermost wrapper down to the failing operator.
    pub fn operator_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self;
        while let EngineError::Operator { operator, source } = current {
            chain.push(operator.as_str());
            current = source;
        }
        chain
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.root(), EngineError::Storage(e) if e.is_transient())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
