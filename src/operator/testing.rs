//! Mock operators shared by unit tests.

use crate::data::{Attribute, AttributeType, Schema, Tuple, Value};
use crate::error::{DataError, EngineResult, StorageError};
use crate::operator::{Lifecycle, Operator};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counters shared between a mock and the test that owns it
#[derive(Clone, Default)]
pub struct Tracker {
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
}

impl Tracker {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Mock source producing a fixed set of rows
pub struct MockSource {
    lifecycle: Lifecycle,
    schema: Arc<Schema>,
    rows: Vec<Vec<Value>>,
    current: usize,
    fail_open: bool,
    fail_at: Option<usize>,
    tracker: Tracker,
}

impl MockSource {
    pub fn new(columns: &[(&str, AttributeType)], rows: Vec<Vec<Value>>) -> Self {
        let schema = Schema::new(
            columns
                .iter()
                .map(|(name, t)| Attribute::new(*name, *t))
                .collect(),
        )
        .expect("mock schema");
        Self::with_schema(schema, rows)
    }

    pub fn with_schema(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self {
            lifecycle: Lifecycle::new("mock"),
            schema: Arc::new(schema),
            rows,
            current: 0,
            fail_open: false,
            fail_at: None,
            tracker: Tracker::default(),
        }
    }

    pub fn named(mut self, id: &str) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail with a storage error when asked for the row at `index`
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

impl Operator for MockSource {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        if self.fail_open {
            return Err(self.lifecycle.wrap(
                StorageError::io(
                    "mock",
                    std::io::Error::new(std::io::ErrorKind::NotFound, "mock open failure"),
                )
                .into(),
            ));
        }
        self.tracker.opens.fetch_add(1, Ordering::SeqCst);
        self.tracker.open.store(true, Ordering::SeqCst);
        self.current = 0;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        if self.fail_at == Some(self.current) {
            return Err(self
                .lifecycle
                .wrap(DataError::Tagger("mock failure".to_string()).into()));
        }
        let Some(row) = self.rows.get(self.current) else {
            return Ok(None);
        };
        self.current += 1;
        let tuple = Tuple::new(self.schema.clone(), row.clone())
            .map_err(|e| self.lifecycle.wrap(e.into()))?;
        Ok(Some(tuple))
    }

    fn close(&mut self) -> EngineResult<()> {
        if self.lifecycle.mark_closed() {
            self.tracker.releases.fetch_add(1, Ordering::SeqCst);
            self.tracker.open.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

/// Drain a boxed operator through a full open/next/close cycle
pub fn run(operator: &mut dyn Operator) -> EngineResult<Vec<Tuple>> {
    operator.open()?;
    let tuples = crate::operator::collect_tuples(operator);
    operator.close()?;
    tuples
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn string(s: &str) -> Value {
    Value::String(s.to_string())
}
