//! Fuzzy token matching.
//!
//! The query and each candidate value are tokenized into multisets. The score
//! is the size of their multiset intersection divided by the number of query
//! tokens; a tuple is accepted when the score reaches the threshold. An empty
//! query or an empty candidate scores zero.

use crate::analyzer::{Analyzer, AnalyzerConfig, StandardAnalyzer};
use crate::data::{Schema, Span, Tuple};
use crate::error::{EngineResult, PlanError};
use crate::matcher::{Matcher, TextFields};
use std::collections::HashMap;

/// Absorbs rounding in `matched / total` when compared with the threshold
const SCORE_EPSILON: f64 = 1e-9;

pub struct FuzzyTokenMatcher {
    query: String,
    threshold: f64,
    query_counts: HashMap<String, usize>,
    query_len: usize,
    fields: TextFields,
    analyzer: StandardAnalyzer,
}

impl FuzzyTokenMatcher {
    pub fn new(
        query: &str,
        attributes: Vec<String>,
        threshold: f64,
        analyzer: AnalyzerConfig,
    ) -> Result<Self, PlanError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(PlanError::invalid(
                "thresholdRatio",
                format!("{} is outside (0, 1]", threshold),
            ));
        }

        let analyzer = analyzer.build();
        let terms = analyzer.terms(query);
        let query_len = terms.len();
        let mut query_counts = HashMap::new();
        for term in terms {
            *query_counts.entry(term).or_insert(0) += 1;
        }

        Ok(Self {
            query: query.to_string(),
            threshold,
            query_counts,
            query_len,
            fields: TextFields::new(attributes)?,
            analyzer,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fraction of query tokens found in `candidate_terms`, as a multiset
    pub fn score<'a>(&self, candidate_terms: impl IntoIterator<Item = &'a str>) -> f64 {
        if self.query_len == 0 {
            return 0.0;
        }
        let mut candidate_counts: HashMap<&str, usize> = HashMap::new();
        for term in candidate_terms {
            *candidate_counts.entry(term).or_insert(0) += 1;
        }
        let matched: usize = self
            .query_counts
            .iter()
            .map(|(term, &count)| count.min(candidate_counts.get(term.as_str()).copied().unwrap_or(0)))
            .sum();
        matched as f64 / self.query_len as f64
    }
}

impl Matcher for FuzzyTokenMatcher {
    fn name(&self) -> &'static str {
        "fuzzy token"
    }

    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.fields.bind(schema)
    }

    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>> {
        let mut matched = false;
        let mut spans = Vec::new();
        for (attribute, text) in self.fields.texts(tuple) {
            let tokens = self.fields.tokens(tuple, attribute, text, &self.analyzer);
            let score = self.score(tokens.iter().map(|t| t.term.as_str()));
            if score > 0.0 && score + SCORE_EPSILON >= self.threshold {
                matched = true;
                spans.extend(
                    tokens
                        .iter()
                        .filter(|t| self.query_counts.contains_key(&t.term))
                        .map(|t| Span::new(attribute, t.text.as_str(), t.start, t.end, t.position)),
                );
            }
        }
        Ok(matched.then_some(spans))
    }
}
