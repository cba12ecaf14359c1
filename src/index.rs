//! Index service consumed by source operators.
//!
//! The engine treats an index as an opaque service: it exposes the schema of
//! its raw rows and hands out readers. Every reader is exclusive to the
//! operator that opened it and is released on close.

pub mod memory;

pub use memory::MemoryIndex;

use crate::data::{Schema, Value};
use crate::error::{PlanError, StorageError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A searchable collection of raw rows
pub trait Index: Send + Sync {
    fn name(&self) -> &str;

    /// Schema of the raw rows (no `_id`, no payload)
    fn schema(&self) -> &Schema;

    /// Reader over every row, in index order
    fn open_reader(&self) -> Result<Box<dyn IndexReader>, StorageError>;

    /// Reader over the rows whose tokenized `attribute` contains every term
    fn open_term_reader(
        &self,
        attribute: &str,
        terms: &[String],
    ) -> Result<Box<dyn IndexReader>, StorageError>;
}

/// Cursor over raw rows
pub trait IndexReader: Send {
    /// Next raw row, or `None` when exhausted
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, StorageError>;

    /// Release the reader. Calling it again is a no-op.
    fn close(&mut self);
}

/// Named registry of indexes available to plans
#[derive(Default)]
pub struct IndexCatalog {
    indexes: RwLock<HashMap<String, Arc<dyn Index>>>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index under its own name, returning any index it replaced
    pub fn register(&self, index: Arc<dyn Index>) -> Option<Arc<dyn Index>> {
        let name = index.name().to_string();
        log::debug!("registering index '{}'", name);
        self.indexes.write().insert(name, index)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Index>, PlanError> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PlanError::UnknownIndex(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.indexes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, AttributeType};

    #[test]
    fn test_catalog_register_and_get() -> anyhow::Result<()> {
        let schema = Schema::new(vec![Attribute::new("content", AttributeType::Text)])?;
        let index = MemoryIndex::new("news", schema, vec![])?;

        let catalog = IndexCatalog::new();
        assert!(catalog.register(Arc::new(index)).is_none());
        assert_eq!(catalog.get("news")?.name(), "news");
        assert!(matches!(
            catalog.get("sports"),
            Err(PlanError::UnknownIndex(name)) if name == "sports"
        ));
        assert_eq!(catalog.names(), vec!["news".to_string()]);
        Ok(())
    }
}
