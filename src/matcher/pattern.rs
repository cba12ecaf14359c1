//! Regular expression span extraction.
//!
//! Patterns are compiled once, when the matcher is built. The `regex` crate
//! guarantees matching in time linear in the input, so hostile patterns
//! cannot blow up evaluation.

use crate::analyzer::{char_offset, token_offset_at, AnalyzerConfig, StandardAnalyzer};
use crate::data::{Schema, Span, Tuple};
use crate::error::{EngineResult, PlanError};
use crate::matcher::{Matcher, TextFields};
use regex::{Regex, RegexBuilder};

pub struct RegexMatcher {
    regex: Regex,
    fields: TextFields,
    analyzer: StandardAnalyzer,
}

impl RegexMatcher {
    pub fn new(
        pattern: &str,
        attributes: Vec<String>,
        case_insensitive: bool,
    ) -> Result<Self, PlanError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|source| PlanError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            regex,
            fields: TextFields::new(attributes)?,
            analyzer: AnalyzerConfig::default().build(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl Matcher for RegexMatcher {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.fields.bind(schema)
    }

    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>> {
        let mut spans = Vec::new();
        for (attribute, text) in self.fields.texts(tuple) {
            let mut tokens = None;
            for m in self.regex.find_iter(text).filter(|m| !m.as_str().is_empty()) {
                let tokens = tokens
                    .get_or_insert_with(|| self.fields.tokens(tuple, attribute, text, &self.analyzer));
                let start = char_offset(text, m.start());
                let end = start + m.as_str().chars().count();
                spans.push(Span::new(
                    attribute,
                    m.as_str(),
                    start,
                    end,
                    token_offset_at(tokens, start),
                ));
            }
        }
        Ok((!spans.is_empty()).then_some(spans))
    }
}
