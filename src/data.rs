//! Schema-typed tuple model.
//!
//! This module provides the substrate every operator works on:
//!
//! - **AttributeType / Value**: the closed set of field types and their
//!   native representations
//! - **Attribute / Schema**: ordered, name-unique attribute lists
//! - **Tuple**: immutable field values bound to a schema
//! - **Span**: match-location metadata carried in list-typed fields
//!
//! Operators never mutate a tuple; they build a new one against their own
//! output schema.

pub mod field;
pub mod schema;
pub mod span;
pub mod tuple;

pub use field::{AttributeType, Value, ValueKey};
pub use schema::{Attribute, Schema, ID_ATTRIBUTE, PAYLOAD_ATTRIBUTE, SPAN_LIST_ATTRIBUTE};
pub use span::Span;
pub use tuple::Tuple;
