//! Matching strategies plugged into [`MatchFilter`](crate::operator::MatchFilter).
//!
//! A matcher decides, per tuple, whether the tuple is accepted and which
//! spans describe the match. Matchers resolve their attributes against the
//! input schema once, when the filter is constructed, and never per tuple.

pub mod comparable;
pub mod dictionary;
pub mod fuzzy;
pub mod keyword;
pub mod nlp;
pub mod pattern;

pub use comparable::{ComparablePredicate, ComparisonType};
pub use dictionary::{Dictionary, DictionaryMatcher};
pub use fuzzy::FuzzyTokenMatcher;
pub use keyword::{KeywordMatcher, KeywordMatchingType, KeywordQuery};
pub use nlp::{LexiconTagger, NlpEntityType, NlpMatcher, TaggedToken, Tagger, TaggerMode};
pub use pattern::RegexMatcher;

use crate::analyzer::{Analyzer, Token};
use crate::data::{Schema, Span, Tuple, PAYLOAD_ATTRIBUTE};
use crate::error::{EngineResult, PlanError};

/// A per-tuple matching strategy
pub trait Matcher: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether accepted tuples carry match spans
    fn produces_spans(&self) -> bool {
        true
    }

    /// Resolve attributes against the input schema
    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError>;

    /// Acquire resources such as dictionary files
    fn open(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// `Some(spans)` if the tuple matches, `None` otherwise
    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>>;

    /// Release resources acquired by `open`
    fn close(&mut self) {}
}

/// The text attributes a matcher reads, resolved to schema positions
#[derive(Debug, Clone)]
pub struct TextFields {
    names: Vec<String>,
    bound: Vec<usize>,
    payload: Option<usize>,
}

impl TextFields {
    pub fn new(names: Vec<String>) -> Result<Self, PlanError> {
        if names.is_empty() {
            return Err(PlanError::invalid("attributes", "at least one attribute is required"));
        }
        Ok(Self {
            names,
            bound: Vec::new(),
            payload: None,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Every attribute must exist and be a string or text attribute
    pub fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.bound = self
            .names
            .iter()
            .map(|name| schema.typed_position(name, "string or text", |t| t.is_textual()))
            .collect::<Result<_, _>>()?;
        self.payload = schema.index_of(PAYLOAD_ATTRIBUTE);
        Ok(())
    }

    /// `(attribute, text)` for every bound attribute that is not NULL
    pub fn texts<'t>(&'t self, tuple: &'t Tuple) -> impl Iterator<Item = (&'t str, &'t str)> {
        self.bound
            .iter()
            .zip(&self.names)
            .filter_map(move |(&index, name)| {
                tuple
                    .get(index)
                    .and_then(|v| v.as_str())
                    .map(|text| (name.as_str(), text))
            })
    }

    /// Tokens of one attribute, taken from the payload when the scan
    /// attached one and produced by `analyzer` otherwise
    pub fn tokens(
        &self,
        tuple: &Tuple,
        attribute: &str,
        text: &str,
        analyzer: &dyn Analyzer,
    ) -> Vec<Token> {
        let from_payload: Vec<Token> = self
            .payload
            .and_then(|index| tuple.get(index))
            .and_then(|v| v.as_spans())
            .unwrap_or(&[])
            .iter()
            .filter(|span| span.key() == attribute)
            .map(|span| Token {
                term: span.value().to_lowercase(),
                text: span.value().to_string(),
                start: span.start(),
                end: span.end(),
                position: span.token_offset(),
            })
            .collect();

        if from_payload.is_empty() {
            analyzer.tokenize(text)
        } else {
            from_payload
        }
    }
}
