//! Keyword matching in three flavours.
//!
//! - **Scan**: the whole attribute value equals the query, ignoring case.
//! - **Substring**: the query occurs anywhere in the value, ignoring case.
//! - **Conjunction**: every query token occurs among the value's tokens, in
//!   any order. Token boundaries are respected, so `book` does not match
//!   `bookstore`. One span is produced per matching token occurrence.

use crate::analyzer::{char_offset, token_offset_at, Analyzer, AnalyzerConfig, StandardAnalyzer, Token};
use crate::data::{Schema, Span, Tuple};
use crate::error::{EngineResult, PlanError};
use crate::matcher::{Matcher, TextFields};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// How a keyword query is compared with attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordMatchingType {
    Conjunction,
    Substring,
    Scan,
}

impl KeywordMatchingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordMatchingType::Conjunction => "Conjunction",
            KeywordMatchingType::Substring => "Substring",
            KeywordMatchingType::Scan => "Scan",
        }
    }
}

impl fmt::Display for KeywordMatchingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeywordMatchingType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Conjunction" => Ok(KeywordMatchingType::Conjunction),
            "Substring" => Ok(KeywordMatchingType::Substring),
            "Scan" => Ok(KeywordMatchingType::Scan),
            _ => Err(PlanError::UnknownToken {
                vocabulary: "keyword matching type",
                value: s.to_string(),
            }),
        }
    }
}

/// A compiled keyword query, independent of any schema
#[derive(Debug, Clone)]
pub struct KeywordQuery {
    query: String,
    matching_type: KeywordMatchingType,
    terms: Vec<String>,
    substring: Option<Regex>,
}

impl KeywordQuery {
    pub fn new(
        query: &str,
        matching_type: KeywordMatchingType,
        analyzer: &dyn Analyzer,
    ) -> Result<Self, PlanError> {
        if query.trim().is_empty() {
            return Err(PlanError::invalid("query", "must not be empty"));
        }

        let mut seen = HashSet::new();
        let terms: Vec<String> = analyzer
            .terms(query)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .collect();
        if matching_type == KeywordMatchingType::Conjunction && terms.is_empty() {
            return Err(PlanError::invalid(
                "query",
                format!("'{}' contains no searchable tokens", query),
            ));
        }

        let substring = match matching_type {
            KeywordMatchingType::Substring => Some(
                RegexBuilder::new(&regex::escape(query))
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| PlanError::InvalidRegex {
                        pattern: query.to_string(),
                        source,
                    })?,
            ),
            _ => None,
        };

        Ok(Self {
            query: query.to_string(),
            matching_type,
            terms,
            substring,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matching_type(&self) -> KeywordMatchingType {
        self.matching_type
    }

    /// Distinct normalized query terms
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Match one attribute value. `tokens` must be the value's tokens.
    pub fn match_text(&self, attribute: &str, text: &str, tokens: &[Token]) -> Option<Vec<Span>> {
        let spans = match self.matching_type {
            KeywordMatchingType::Scan => {
                if text.to_lowercase() != self.query.to_lowercase() {
                    return None;
                }
                vec![Span::new(attribute, text, 0, text.chars().count(), 0)]
            }
            KeywordMatchingType::Substring => {
                let regex = self.substring.as_ref()?;
                regex
                    .find_iter(text)
                    .map(|m| {
                        let start = char_offset(text, m.start());
                        let end = start + m.as_str().chars().count();
                        Span::new(attribute, m.as_str(), start, end, token_offset_at(tokens, start))
                    })
                    .collect()
            }
            KeywordMatchingType::Conjunction => {
                let present: HashSet<&str> = tokens.iter().map(|t| t.term.as_str()).collect();
                if !self.terms.iter().all(|term| present.contains(term.as_str())) {
                    return None;
                }
                tokens
                    .iter()
                    .filter(|t| self.terms.contains(&t.term))
                    .map(|t| Span::new(attribute, t.text.as_str(), t.start, t.end, t.position))
                    .collect()
            }
        };
        (!spans.is_empty()).then_some(spans)
    }
}

/// Keyword matcher over one or more text attributes.
///
/// A tuple matches if any attribute matches; spans from every matching
/// attribute are returned.
pub struct KeywordMatcher {
    query: KeywordQuery,
    fields: TextFields,
    analyzer: StandardAnalyzer,
}

impl KeywordMatcher {
    pub fn new(
        query: &str,
        attributes: Vec<String>,
        matching_type: KeywordMatchingType,
        analyzer: AnalyzerConfig,
    ) -> Result<Self, PlanError> {
        let analyzer = analyzer.build();
        Ok(Self {
            query: KeywordQuery::new(query, matching_type, &analyzer)?,
            fields: TextFields::new(attributes)?,
            analyzer,
        })
    }

    pub fn query(&self) -> &KeywordQuery {
        &self.query
    }

    pub fn attributes(&self) -> &[String] {
        self.fields.names()
    }
}

impl Matcher for KeywordMatcher {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.fields.bind(schema)
    }

    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>> {
        let mut matched = false;
        let mut spans = Vec::new();
        for (attribute, text) in self.fields.texts(tuple) {
            let tokens = self.fields.tokens(tuple, attribute, text, &self.analyzer);
            if let Some(found) = self.query.match_text(attribute, text, &tokens) {
                matched = true;
                spans.extend(found);
            }
        }
        Ok(matched.then_some(spans))
    }
}
