//! Terminal operators.
//!
//! A sink is still an [`Operator`], so it can be opened, pulled and closed
//! like any other node, but the driver only calls
//! [`process_tuples`](Sink::process_tuples), which drains the input.

use crate::data::{Schema, Tuple, PAYLOAD_ATTRIBUTE};
use crate::error::{EngineError, EngineResult, StorageError};
use crate::operator::{close_after_failure, close_children, BoxedOperator, Lifecycle, Operator};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Operator at the root of a plan
pub trait Sink: Operator {
    /// Pull every tuple from the input, returning how many were consumed
    fn process_tuples(&mut self) -> EngineResult<usize>;

    /// Tuples kept in memory by the last evaluation, if the sink keeps any
    fn take_results(&mut self) -> Vec<Tuple> {
        Vec::new()
    }
}

pub type BoxedSink = Box<dyn Sink>;

/// Sink that keeps results in memory.
///
/// The `payload` attribute is dropped from its output. An optional chart
/// label is carried along for front ends and has no effect on evaluation.
pub struct TupleSink {
    lifecycle: Lifecycle,
    child: BoxedOperator,
    output_schema: Arc<Schema>,
    payload: Option<usize>,
    limit: Option<usize>,
    offset: usize,
    skipped: usize,
    returned: usize,
    chart: Option<String>,
    results: Vec<Tuple>,
}

impl TupleSink {
    pub fn new(child: BoxedOperator) -> Self {
        let input = child.output_schema();
        let payload = input.index_of(PAYLOAD_ATTRIBUTE);
        let output_schema = match payload {
            Some(_) => Arc::new(input.without(PAYLOAD_ATTRIBUTE)),
            None => input.clone(),
        };
        Self {
            lifecycle: Lifecycle::new("sink"),
            child,
            output_schema,
            payload,
            limit: None,
            offset: 0,
            skipped: 0,
            returned: 0,
            chart: None,
            results: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_chart(mut self, chart: impl Into<String>) -> Self {
        self.chart = Some(chart.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    pub fn chart(&self) -> Option<&str> {
        self.chart.as_deref()
    }

    /// Tuples collected by the last evaluation
    pub fn results(&self) -> &[Tuple] {
        &self.results
    }

    fn strip_payload(&self, tuple: Tuple) -> EngineResult<Tuple> {
        let Some(position) = self.payload else {
            return Ok(tuple);
        };
        let mut fields = tuple.into_fields();
        fields.remove(position);
        Tuple::new(self.output_schema.clone(), fields).map_err(EngineError::from)
    }

    fn produce(&mut self) -> EngineResult<Option<Tuple>> {
        while self.skipped < self.offset {
            if self.child.next_tuple()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }
        match self.child.next_tuple()? {
            Some(tuple) => self.strip_payload(tuple).map(Some),
            None => Ok(None),
        }
    }
}

impl Operator for TupleSink {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;
        self.skipped = 0;
        self.returned = 0;
        self.results.clear();
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        if self.limit.is_some_and(|limit| self.returned >= limit) {
            return Ok(None);
        }
        let tuple = self.produce().map_err(|e| self.lifecycle.wrap(e))?;
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
        &self.output_schema
    }
}

impl Sink for TupleSink {
    fn process_tuples(&mut self) -> EngineResult<usize> {
        while let Some(tuple) = self.next_tuple()? {
            self.results.push(tuple);
        }
        Ok(self.results.len())
    }

    fn take_results(&mut self) -> Vec<Tuple> {
        std::mem::take(&mut self.results)
    }
}

/// Where a [`JsonLinesSink`] writes
enum Destination {
    /// Created, truncating any earlier content, each time the sink opens
    File(PathBuf),
    Stream {
        label: PathBuf,
        writer: Box<dyn Write + Send>,
    },
}

/// Sink writing one JSON object per tuple, keyed by attribute name
pub struct JsonLinesSink {
    lifecycle: Lifecycle,
    child: BoxedOperator,
    destination: Destination,
    /// Open file of a `Destination::File` between `open` and `close`
    file: Option<BufWriter<File>>,
    written: usize,
}

impl JsonLinesSink {
    /// Write to a caller-supplied stream; `label` names it in error messages
    pub fn new(child: BoxedOperator, writer: Box<dyn Write + Send>, label: impl Into<PathBuf>) -> Self {
        Self::with_destination(
            child,
            Destination::Stream {
                label: label.into(),
                writer,
            },
        )
    }

    /// Write to `path`. The file is only created when the sink opens.
    pub fn to_file(child: BoxedOperator, path: impl Into<PathBuf>) -> Self {
        Self::with_destination(child, Destination::File(path.into()))
    }

    pub fn stdout(child: BoxedOperator) -> Self {
        Self::new(child, Box::new(std::io::stdout()), "<stdout>")
    }

    fn with_destination(child: BoxedOperator, destination: Destination) -> Self {
        Self {
            lifecycle: Lifecycle::new("json sink"),
            child,
            destination,
            file: None,
            written: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn target(&self) -> &Path {
        match &self.destination {
            Destination::File(path) => path,
            Destination::Stream { label, .. } => label,
        }
    }

    fn output(&mut self) -> Result<&mut dyn Write, StorageError> {
        match &mut self.destination {
            Destination::Stream { writer, .. } => Ok(writer.as_mut()),
            Destination::File(path) => match self.file.as_mut() {
                Some(file) => Ok(file),
                None => Err(StorageError::io(
                    path.as_path(),
                    std::io::Error::new(std::io::ErrorKind::NotConnected, "output is not open"),
                )),
            },
        }
    }

    fn write(&mut self, tuple: &Tuple) -> Result<(), StorageError> {
        let line = serde_json::Value::Object(tuple.to_json_object()).to_string();
        let result = writeln!(self.output()?, "{}", line);
        result.map_err(|e| StorageError::io(self.target(), e))
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        let result = self.output()?.flush();
        result.map_err(|e| StorageError::io(self.target(), e))
    }
}

impl Operator for JsonLinesSink {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;
        if let Destination::File(path) = &self.destination {
            match File::create(path) {
                Ok(file) => self.file = Some(BufWriter::new(file)),
                Err(e) => {
                    let error = StorageError::io(path.as_path(), e);
                    close_after_failure(&mut self.child);
                    return Err(self.lifecycle.wrap(error.into()));
                }
            }
        }
        self.written = 0;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        self.child.next_tuple().map_err(|e| self.lifecycle.wrap(e))
    }

    fn close(&mut self) -> EngineResult<()> {
        if self.lifecycle.mark_closed() {
            if let Err(e) = self.flush() {
                log::warn!("flushing '{}' failed: {}", self.lifecycle.id(), e);
            }
            self.file = None;
        }
        close_children(&mut [&mut self.child]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        self.child.output_schema()
    }
}

impl Sink for JsonLinesSink {
    fn process_tuples(&mut self) -> EngineResult<usize> {
        while let Some(tuple) = self.next_tuple()? {
            self.write(&tuple)
                .map_err(|e| self.lifecycle.wrap(e.into()))?;
            self.written += 1;
        }
        self.flush().map_err(|e| self.lifecycle.wrap(e.into()))?;
        Ok(self.written)
    }
}
