//! In-memory index with term postings and file snapshots.

use crate::analyzer::{Analyzer, StandardAnalyzer};
use crate::data::{AttributeType, Schema, Tuple, Value};
use crate::error::{DataError, StorageError};
use crate::index::{Index, IndexReader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Rows held in memory with a postings list per (text attribute, term)
pub struct MemoryIndex {
    name: String,
    schema: Schema,
    rows: Arc<Vec<Vec<Value>>>,
    postings: HashMap<(usize, String), Vec<usize>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    name: &'a str,
    schema: &'a Schema,
    rows: &'a [Vec<Value>],
}

#[derive(Deserialize)]
struct Snapshot {
    name: String,
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct Documents {
    schema: Schema,
    rows: Vec<Vec<serde_json::Value>>,
}

impl MemoryIndex {
    /// Build an index, checking every row against the schema
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, DataError> {
        let shared = Arc::new(schema.clone());
        let rows = rows
            .into_iter()
            .map(|row| Tuple::new(shared.clone(), row).map(Tuple::into_fields))
            .collect::<Result<Vec<_>, _>>()?;
        let postings = Self::build_postings(&schema, &rows);

        Ok(Self {
            name: name.into(),
            schema,
            rows: Arc::new(rows),
            postings,
        })
    }

    fn build_postings(schema: &Schema, rows: &[Vec<Value>]) -> HashMap<(usize, String), Vec<usize>> {
        let analyzer = StandardAnalyzer::new();
        let text_columns: Vec<usize> = schema
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, a)| a.attribute_type() == AttributeType::Text)
            .map(|(i, _)| i)
            .collect();

        let mut postings: HashMap<(usize, String), Vec<usize>> = HashMap::new();
        for (row_id, row) in rows.iter().enumerate() {
            for &column in &text_columns {
                let Some(text) = row[column].as_str() else {
                    continue;
                };
                for term in analyzer.terms(text) {
                    let list = postings.entry((column, term)).or_default();
                    if list.last() != Some(&row_id) {
                        list.push(row_id);
                    }
                }
            }
        }
        postings
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write a bincode snapshot of this index
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| StorageError::io(path, e))?;
        let snapshot = SnapshotRef {
            name: &self.name,
            schema: &self.schema,
            rows: &self.rows,
        };
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &snapshot).map_err(|source| StorageError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|e| StorageError::io(path, e))
    }

    /// Load a bincode snapshot written by [`MemoryIndex::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
        let snapshot: Snapshot =
            bincode::deserialize_from(BufReader::new(file)).map_err(|source| {
                StorageError::Codec {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        Self::new(snapshot.name, snapshot.schema, snapshot.rows).map_err(|e| {
            StorageError::Documents {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }

    /// Load a JSON document file: `{"schema": [...], "rows": [[...], ...]}`
    pub fn from_json_documents(
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let malformed = |reason: String| StorageError::Documents {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
        let documents: Documents = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| malformed(e.to_string()))?;

        let mut rows = Vec::with_capacity(documents.rows.len());
        for (row_number, raw) in documents.rows.iter().enumerate() {
            if raw.len() != documents.schema.len() {
                return Err(malformed(format!(
                    "row {} has {} values, schema has {} attributes",
                    row_number,
                    raw.len(),
                    documents.schema.len()
                )));
            }
            let row = raw
                .iter()
                .zip(documents.schema.attributes())
                .map(|(json, attribute)| {
                    Value::from_json(json, attribute.name(), attribute.attribute_type())
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| malformed(format!("row {}: {}", row_number, e)))?;
            rows.push(row);
        }

        Self::new(name, documents.schema, rows).map_err(|e| malformed(e.to_string()))
    }
}

impl Index for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open_reader(&self) -> Result<Box<dyn IndexReader>, StorageError> {
        Ok(Box::new(MemoryReader::new(&self.name, self.rows.clone(), None)))
    }

    fn open_term_reader(
        &self,
        attribute: &str,
        terms: &[String],
    ) -> Result<Box<dyn IndexReader>, StorageError> {
        let selection = match self.schema.index_of(attribute) {
            Some(column) if !terms.is_empty() => {
                intersect_postings(terms.iter().map(|term| {
                    self.postings
                        .get(&(column, term.clone()))
                        .map(Vec::as_slice)
                        .unwrap_or(&[])
                }))
            }
            _ => Vec::new(),
        };
        Ok(Box::new(MemoryReader::new(
            &self.name,
            self.rows.clone(),
            Some(selection),
        )))
    }
}

/// Intersection of sorted row-id lists
fn intersect_postings<'a>(mut lists: impl Iterator<Item = &'a [usize]>) -> Vec<usize> {
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let mut result = first.to_vec();
    for list in lists {
        result.retain(|id| list.binary_search(id).is_ok());
        if result.is_empty() {
            break;
        }
    }
    result
}

struct MemoryReader {
    index_name: String,
    rows: Arc<Vec<Vec<Value>>>,
    selection: Option<Vec<usize>>,
    cursor: usize,
    closed: bool,
}

impl MemoryReader {
    fn new(index_name: &str, rows: Arc<Vec<Vec<Value>>>, selection: Option<Vec<usize>>) -> Self {
        Self {
            index_name: index_name.to_string(),
            rows,
            selection,
            cursor: 0,
            closed: false,
        }
    }
}

impl IndexReader for MemoryReader {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, StorageError> {
        if self.closed {
            return Err(StorageError::ReaderClosed(self.index_name.clone()));
        }
        let row_id = match &self.selection {
            Some(selection) => selection.get(self.cursor).copied(),
            None => (self.cursor < self.rows.len()).then_some(self.cursor),
        };
        self.cursor += 1;
        Ok(row_id.map(|id| self.rows[id].clone()))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
