//! Index-backed source operators.

use crate::analyzer::{Analyzer, AnalyzerConfig, StandardAnalyzer};
use crate::data::{Attribute, AttributeType, Schema, Span, Tuple, Value};
use crate::error::{EngineError, EngineResult, PlanError};
use crate::index::{Index, IndexReader};
use crate::matcher::{KeywordMatcher, KeywordMatchingType};
use crate::operator::{Lifecycle, MatchFilter, Operator};
use std::sync::Arc;
use uuid::Uuid;

/// Restricts a scan to the rows whose attribute holds every term
#[derive(Debug, Clone)]
struct TermLookup {
    attribute: String,
    terms: Vec<String>,
}

/// Full scan over an index.
///
/// Every row gets a fresh `_id` in front. With a payload, the tokens of all
/// TEXT attributes are appended as spans so downstream matchers can skip
/// re-tokenizing.
pub struct ScanSource {
    lifecycle: Lifecycle,
    index: Arc<dyn Index>,
    output_schema: Arc<Schema>,
    /// Positions of TEXT attributes in the raw rows
    text_columns: Vec<usize>,
    with_payload: bool,
    lookup: Option<TermLookup>,
    limit: Option<usize>,
    offset: usize,
    reader: Option<Box<dyn IndexReader>>,
    skipped: usize,
    returned: usize,
    analyzer: StandardAnalyzer,
}

impl ScanSource {
    pub fn new(index: Arc<dyn Index>) -> Result<Self, PlanError> {
        let output_schema = Arc::new(index.schema().with_id()?);
        let text_columns = index
            .schema()
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, a)| a.attribute_type() == AttributeType::Text)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            lifecycle: Lifecycle::new("scan"),
            index,
            output_schema,
            text_columns,
            with_payload: false,
            lookup: None,
            limit: None,
            offset: 0,
            reader: None,
            skipped: 0,
            returned: 0,
            analyzer: StandardAnalyzer::new(),
        })
    }

    /// Append the `payload` attribute
    pub fn with_payload(mut self) -> Result<Self, PlanError> {
        if !self.with_payload {
            self.output_schema = Arc::new(self.output_schema.append(Attribute::payload())?);
            self.with_payload = true;
        }
        Ok(self)
    }

    pub fn with_limit(mut self, limit: Option<usize>, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    fn restricted_to(mut self, attribute: &str, terms: &[String]) -> Self {
        self.lookup = Some(TermLookup {
            attribute: attribute.to_string(),
            terms: terms.to_vec(),
        });
        self
    }

    fn payload(&self, row: &[Value]) -> Vec<Span> {
        let attributes = self.index.schema().attributes();
        self.text_columns
            .iter()
            .filter_map(|&column| row[column].as_str().map(|text| (column, text)))
            .flat_map(|(column, text)| {
                let name = attributes[column].name();
                self.analyzer
                    .tokenize(text)
                    .into_iter()
                    .map(move |t| Span::new(name, t.text, t.start, t.end, t.position))
            })
            .collect()
    }

    fn next_row(&mut self) -> EngineResult<Option<Vec<Value>>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        Ok(reader.next_row()?)
    }

    fn produce(&mut self) -> EngineResult<Option<Tuple>> {
        if self.limit.is_some_and(|limit| self.returned >= limit) {
            return Ok(None);
        }
        while self.skipped < self.offset {
            if self.next_row()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }

        let Some(row) = self.next_row()? else {
            return Ok(None);
        };
        let mut fields = Vec::with_capacity(self.output_schema.len());
        fields.push(Value::Id(Uuid::new_v4()));
        if self.with_payload {
            let payload = self.payload(&row);
            fields.extend(row);
            fields.push(Value::List(payload));
        } else {
            fields.extend(row);
        }
        self.returned += 1;
        Tuple::new(self.output_schema.clone(), fields)
            .map(Some)
            .map_err(EngineError::from)
    }
}

impl Operator for ScanSource {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        let reader = match &self.lookup {
            Some(lookup) => self.index.open_term_reader(&lookup.attribute, &lookup.terms),
            None => self.index.open_reader(),
        }
        .map_err(|e| self.lifecycle.wrap(e.into()))?;

        log::debug!("scan '{}' reading index '{}'", self.lifecycle.id(), self.index.name());
        self.reader = Some(reader);
        self.skipped = 0;
        self.returned = 0;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        self.produce().map_err(|e| self.lifecycle.wrap(e))
    }

    fn close(&mut self) -> EngineResult<()> {
        self.lifecycle.mark_closed();
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        Ok(())
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}

/// Keyword search over an index.
///
/// A scan feeding a keyword filter. For a conjunctive query on a single TEXT
/// attribute the scan only reads rows from the index postings, and the
/// filter then produces the spans.
pub struct KeywordSource {
    filter: MatchFilter,
    indexed: bool,
}

impl KeywordSource {
    pub fn new(
        index: Arc<dyn Index>,
        query: &str,
        attributes: Vec<String>,
        matching_type: KeywordMatchingType,
        analyzer: AnalyzerConfig,
    ) -> Result<Self, PlanError> {
        let matcher = KeywordMatcher::new(query, attributes, matching_type, analyzer)?;

        let lookup = match (matching_type, matcher.attributes()) {
            (KeywordMatchingType::Conjunction, [attribute])
                if index
                    .schema()
                    .attribute(attribute)
                    .is_ok_and(|a| a.attribute_type() == AttributeType::Text) =>
            {
                Some(attribute.clone())
            }
            _ => None,
        };

        let mut scan = ScanSource::new(index)?;
        if let Some(attribute) = &lookup {
            scan = scan.restricted_to(attribute, matcher.query().terms());
        }
        let scan = scan.with_id("keyword scan");

        Ok(Self {
            filter: MatchFilter::new(Box::new(scan), Box::new(matcher))?.with_id("keyword source"),
            indexed: lookup.is_some(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.filter = self.filter.with_id(id);
        self
    }

    /// Whether rows are looked up through the index postings
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }
}

impl Operator for KeywordSource {
    fn id(&self) -> &str {
        self.filter.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.filter.open()
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.filter.next_tuple()
    }

    fn close(&mut self) -> EngineResult<()> {
        self.filter.close()
    }

    fn output_schema(&self) -> &Arc<Schema> {
        self.filter.output_schema()
    }
}
