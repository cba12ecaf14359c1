//! Dictionary matching: every entry is a keyword query of its own.
//!
//! Entries are matched independently with one keyword matching type. A tuple
//! passes if any entry matches any attribute, and each span's value is the
//! entry that produced it.

use crate::analyzer::{AnalyzerConfig, StandardAnalyzer};
use crate::data::{Schema, Span, Tuple};
use crate::error::{EngineResult, PlanError, StorageError};
use crate::matcher::{KeywordMatchingType, KeywordQuery, Matcher, TextFields};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where dictionary entries come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dictionary {
    /// Entries listed directly in the plan
    Inline(Vec<String>),
    /// One entry per non-blank line, read when the matcher opens. Lines that
    /// do not form a query are skipped; a file without a single usable entry
    /// is an error.
    File(PathBuf),
}

pub struct DictionaryMatcher {
    dictionary: Dictionary,
    matching_type: KeywordMatchingType,
    fields: TextFields,
    analyzer: StandardAnalyzer,
    entries: Vec<KeywordQuery>,
    skipped: usize,
}

impl DictionaryMatcher {
    pub fn new(
        dictionary: Dictionary,
        attributes: Vec<String>,
        matching_type: KeywordMatchingType,
        analyzer: AnalyzerConfig,
    ) -> Result<Self, PlanError> {
        let analyzer = analyzer.build();
        let entries = match &dictionary {
            Dictionary::Inline(entries) => {
                if entries.is_empty() {
                    return Err(PlanError::invalid("dictionary", "must contain at least one entry"));
                }
                entries
                    .iter()
                    .map(|entry| KeywordQuery::new(entry, matching_type, &analyzer))
                    .collect::<Result<Vec<_>, _>>()?
            }
            Dictionary::File(_) => Vec::new(),
        };

        Ok(Self {
            dictionary,
            matching_type,
            fields: TextFields::new(attributes)?,
            analyzer,
            entries,
            skipped: 0,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Number of compiled entries; zero for a file dictionary that is not open
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// File lines skipped by the last open
    pub fn skipped_entries(&self) -> usize {
        self.skipped
    }

    fn load(&self, path: &Path) -> Result<(Vec<KeywordQuery>, usize), StorageError> {
        let content = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        let mut entries = Vec::new();
        let mut skipped = 0;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match KeywordQuery::new(line, self.matching_type, &self.analyzer) {
                Ok(query) => entries.push(query),
                Err(e) => {
                    log::debug!("skipping dictionary entry '{}' in {}: {}", line, path.display(), e);
                    skipped += 1;
                }
            }
        }

        if entries.is_empty() {
            return Err(StorageError::Documents {
                path: path.to_path_buf(),
                reason: format!("no usable dictionary entries ({} skipped)", skipped),
            });
        }
        if skipped > 0 {
            log::warn!(
                "skipped {} of {} dictionary entries in {}",
                skipped,
                skipped + entries.len(),
                path.display()
            );
        }
        log::debug!(
            "loaded {} dictionary entries from {} ({} skipped)",
            entries.len(),
            path.display(),
            skipped
        );
        Ok((entries, skipped))
    }
}

impl Matcher for DictionaryMatcher {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.fields.bind(schema)
    }

    fn open(&mut self) -> EngineResult<()> {
        if let Dictionary::File(path) = &self.dictionary {
            (self.entries, self.skipped) = self.load(path)?;
        }
        Ok(())
    }

    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>> {
        let mut matched = false;
        let mut spans = Vec::new();
        for (attribute, text) in self.fields.texts(tuple) {
            let tokens = self.fields.tokens(tuple, attribute, text, &self.analyzer);
            for entry in &self.entries {
                if let Some(found) = entry.match_text(attribute, text, &tokens) {
                    matched = true;
                    spans.extend(found.iter().map(|span| span.relabeled(entry.query())));
                }
            }
        }
        Ok(matched.then_some(spans))
    }

    fn close(&mut self) {
        if matches!(self.dictionary, Dictionary::File(_)) {
            self.entries.clear();
        }
    }
}
