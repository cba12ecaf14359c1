//! Named-entity and part-of-speech extraction through an external tagger.
//!
//! The tagger itself is a collaborator behind the [`Tagger`] trait. The
//! matcher decides once, at construction, which tagger mode its selector
//! needs, keeps the tokens whose tag the selector accepts, and merges runs of
//! adjacent named-entity tokens carrying the same tag into a single phrase.

use crate::analyzer::{Analyzer, StandardAnalyzer};
use crate::data::{Schema, Span, Tuple};
use crate::error::{DataError, EngineResult, PlanError};
use crate::matcher::{Matcher, TextFields};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Entity and part-of-speech selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NlpEntityType {
    Person,
    Organization,
    Location,
    Money,
    Percent,
    Date,
    Time,
    Number,
    /// Every named-entity tag
    NeAll,
    Noun,
    Verb,
    Adjective,
    Adverb,
}

/// Which analysis the tagger runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggerMode {
    NamedEntity,
    PartOfSpeech,
}

impl NlpEntityType {
    pub const ALL: [NlpEntityType; 13] = [
        NlpEntityType::Person,
        NlpEntityType::Organization,
        NlpEntityType::Location,
        NlpEntityType::Money,
        NlpEntityType::Percent,
        NlpEntityType::Date,
        NlpEntityType::Time,
        NlpEntityType::Number,
        NlpEntityType::NeAll,
        NlpEntityType::Noun,
        NlpEntityType::Verb,
        NlpEntityType::Adjective,
        NlpEntityType::Adverb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NlpEntityType::Person => "person",
            NlpEntityType::Organization => "organization",
            NlpEntityType::Location => "location",
            NlpEntityType::Money => "money",
            NlpEntityType::Percent => "percent",
            NlpEntityType::Date => "date",
            NlpEntityType::Time => "time",
            NlpEntityType::Number => "number",
            NlpEntityType::NeAll => "ne_all",
            NlpEntityType::Noun => "noun",
            NlpEntityType::Verb => "verb",
            NlpEntityType::Adjective => "adjective",
            NlpEntityType::Adverb => "adverb",
        }
    }

    pub fn mode(&self) -> TaggerMode {
        match self {
            NlpEntityType::Noun
            | NlpEntityType::Verb
            | NlpEntityType::Adjective
            | NlpEntityType::Adverb => TaggerMode::PartOfSpeech,
            _ => TaggerMode::NamedEntity,
        }
    }

    /// Whether a token tagged `tag` satisfies this selector
    pub fn accepts(&self, tag: NlpEntityType) -> bool {
        match self {
            NlpEntityType::NeAll => {
                tag != NlpEntityType::NeAll && tag.mode() == TaggerMode::NamedEntity
            }
            selector => *selector == tag,
        }
    }
}

impl fmt::Display for NlpEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NlpEntityType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NlpEntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PlanError::UnknownToken {
                vocabulary: "nlp entity type",
                value: s.to_string(),
            })
    }
}

/// One token the tagger labelled. Offsets are character offsets into the
/// tagged text; `sentence_token` is the token's index within its sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedToken {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub sentence_token: usize,
    pub tag: NlpEntityType,
}

/// External tagger contract
pub trait Tagger: Send + Sync {
    /// Tag `text`. Tokens without a label in `mode` are omitted.
    fn tag(&self, text: &str, mode: TaggerMode) -> Result<Vec<TaggedToken>, DataError>;
}

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];
const DAYS: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "today",
    "tomorrow", "yesterday",
];
const TIMES: &[&str] = &["pm", "noon", "midnight", "morning", "evening", "tonight"];
const ORGANIZATION_SUFFIXES: &[&str] = &[
    "inc", "corp", "corporation", "ltd", "llc", "company", "university", "institute", "bank",
];
const FUNCTION_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "of", "in", "on", "at", "to", "for", "with",
    "by", "from", "as", "into", "it", "he", "she", "they", "we", "i", "you", "this", "that",
    "these", "those", "his", "her", "their", "its", "our", "my", "your", "not", "no",
];
const VERBS: &[&str] = &[
    "is", "are", "was", "were", "be", "been", "am", "have", "has", "had", "do", "does", "did",
    "go", "goes", "went", "make", "makes", "made", "say", "says", "said", "get", "got", "see",
    "saw", "take", "took", "run", "runs", "ran", "buy", "buys", "bought", "pay", "pays", "paid",
    "meet", "met", "visit", "visits",
];
const ADJECTIVES: &[&str] = &[
    "good", "bad", "new", "old", "big", "small", "great", "little", "long", "short", "high",
    "low", "quick", "slow", "brown", "red", "lazy", "happy", "young",
];

/// Rule-and-lexicon tagger used when no external model is configured.
///
/// Named entities come from a word lexicon, calendar words, numeric shapes
/// (`$40` is money, `15%` is a percent) and organization suffixes, which
/// also claim the capitalized words directly before them. Parts of speech
/// come from small word lists and suffix rules.
#[derive(Debug, Clone, Default)]
pub struct LexiconTagger {
    lexicon: HashMap<String, NlpEntityType>,
}

impl LexiconTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label `word` (matched case-insensitively) with a named-entity tag
    pub fn with_entity(mut self, word: &str, tag: NlpEntityType) -> Self {
        self.lexicon.insert(word.to_lowercase(), tag);
        self
    }

    fn entity_tag(&self, term: &str, before: Option<char>, after: Option<char>) -> Option<NlpEntityType> {
        if let Some(tag) = self.lexicon.get(term) {
            return Some(*tag);
        }
        if term.chars().all(|c| c.is_ascii_digit()) {
            return Some(match (before, after) {
                (Some('$'), _) => NlpEntityType::Money,
                (_, Some('%')) => NlpEntityType::Percent,
                (_, Some(':')) => NlpEntityType::Time,
                _ => NlpEntityType::Number,
            });
        }
        if MONTHS.contains(&term) || DAYS.contains(&term) {
            return Some(NlpEntityType::Date);
        }
        if TIMES.contains(&term) {
            return Some(NlpEntityType::Time);
        }
        None
    }

    fn pos_tag(term: &str) -> Option<NlpEntityType> {
        if FUNCTION_WORDS.contains(&term) || !term.chars().all(char::is_alphabetic) {
            return None;
        }
        let tag = if VERBS.contains(&term) {
            NlpEntityType::Verb
        } else if ADJECTIVES.contains(&term) {
            NlpEntityType::Adjective
        } else if term.len() > 3 && term.ends_with("ly") {
            NlpEntityType::Adverb
        } else if term.len() > 4 && (term.ends_with("ing") || term.ends_with("ed")) {
            NlpEntityType::Verb
        } else if ["ous", "ful", "able", "ible", "ive", "less"]
            .iter()
            .any(|suffix| term.len() > suffix.len() + 2 && term.ends_with(suffix))
        {
            NlpEntityType::Adjective
        } else {
            NlpEntityType::Noun
        };
        Some(tag)
    }
}

impl Tagger for LexiconTagger {
    fn tag(&self, text: &str, mode: TaggerMode) -> Result<Vec<TaggedToken>, DataError> {
        let chars: Vec<char> = text.chars().collect();
        let tokens = StandardAnalyzer::new().tokenize(text);

        // sentence-relative index of every token
        let mut sentence_tokens = Vec::with_capacity(tokens.len());
        let mut index = 0;
        let mut previous_end = 0;
        for token in &tokens {
            let gap = &chars[previous_end..token.start];
            let boundary = gap.iter().any(|c| matches!(c, '.' | '!' | '?'))
                && gap.iter().any(|c| c.is_whitespace());
            if boundary {
                index = 0;
            }
            sentence_tokens.push(index);
            index += 1;
            previous_end = token.end;
        }

        let mut tags: Vec<Option<NlpEntityType>> = match mode {
            TaggerMode::PartOfSpeech => tokens.iter().map(|t| Self::pos_tag(&t.term)).collect(),
            TaggerMode::NamedEntity => tokens
                .iter()
                .map(|t| {
                    let before = t.start.checked_sub(1).map(|i| chars[i]);
                    let after = chars.get(t.end).copied();
                    self.entity_tag(&t.term, before, after)
                })
                .collect(),
        };

        if mode == TaggerMode::NamedEntity {
            for i in 0..tokens.len() {
                let capitalized = |t: &crate::analyzer::Token| t.text.starts_with(char::is_uppercase);
                if tags[i].is_none()
                    && ORGANIZATION_SUFFIXES.contains(&tokens[i].term.as_str())
                    && capitalized(&tokens[i])
                {
                    tags[i] = Some(NlpEntityType::Organization);
                    let mut j = i;
                    while j > 0
                        && sentence_tokens[j] > 0
                        && tags[j - 1].is_none()
                        && capitalized(&tokens[j - 1])
                    {
                        tags[j - 1] = Some(NlpEntityType::Organization);
                        j -= 1;
                    }
                }
            }
        }

        Ok(tokens
            .into_iter()
            .zip(sentence_tokens)
            .zip(tags)
            .filter_map(|((token, sentence_token), tag)| {
                tag.map(|tag| TaggedToken {
                    text: token.text,
                    start: token.start,
                    end: token.end,
                    sentence_token,
                    tag,
                })
            })
            .collect())
    }
}

/// Matcher emitting a span per entity phrase or tagged word
pub struct NlpMatcher {
    entity_type: NlpEntityType,
    mode: TaggerMode,
    tagger: Arc<dyn Tagger>,
    fields: TextFields,
}

impl NlpMatcher {
    pub fn new(
        entity_type: NlpEntityType,
        attributes: Vec<String>,
        tagger: Arc<dyn Tagger>,
    ) -> Result<Self, PlanError> {
        Ok(Self {
            entity_type,
            mode: entity_type.mode(),
            tagger,
            fields: TextFields::new(attributes)?,
        })
    }

    pub fn entity_type(&self) -> NlpEntityType {
        self.entity_type
    }

    pub fn mode(&self) -> TaggerMode {
        self.mode
    }
}

/// Merge consecutive tokens of one sentence that carry the same tag and are
/// separated only by whitespace
fn merge_phrases(text: &str, tokens: Vec<TaggedToken>) -> Vec<TaggedToken> {
    let chars: Vec<char> = text.chars().collect();
    let mut merged: Vec<TaggedToken> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Some(last) = merged.last_mut() {
            let adjacent = last.tag == token.tag
                && token.sentence_token > 0
                && last.end <= token.start
                && chars[last.end..token.start].iter().all(|c| c.is_whitespace());
            if adjacent {
                last.end = token.end;
                last.text = chars[last.start..last.end].iter().collect();
                continue;
            }
        }
        merged.push(token);
    }
    merged
}

impl Matcher for NlpMatcher {
    fn name(&self) -> &'static str {
        "nlp"
    }

    fn bind(&mut self, schema: &Schema) -> Result<(), PlanError> {
        self.fields.bind(schema)
    }

    fn evaluate(&mut self, tuple: &Tuple) -> EngineResult<Option<Vec<Span>>> {
        let mut spans = Vec::new();
        for (attribute, text) in self.fields.texts(tuple) {
            let tagged: Vec<TaggedToken> = self
                .tagger
                .tag(text, self.mode)?
                .into_iter()
                .filter(|t| self.entity_type.accepts(t.tag))
                .collect();
            let tagged = match self.mode {
                TaggerMode::NamedEntity => merge_phrases(text, tagged),
                TaggerMode::PartOfSpeech => tagged,
            };
            spans.extend(
                tagged
                    .into_iter()
                    .map(|t| Span::new(attribute, t.text, t.start, t.end, t.sentence_token)),
            );
        }
        Ok((!spans.is_empty()).then_some(spans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, AttributeType, Value};
    use crate::error::ErrorKind;

    fn candidate(text: &str) -> Tuple {
        let schema = Schema::new(vec![Attribute::new("content", AttributeType::Text)]).unwrap();
        Tuple::new(Arc::new(schema), vec![Value::Text(text.to_string())]).unwrap()
    }

    fn matcher(entity_type: NlpEntityType, tagger: Arc<dyn Tagger>) -> NlpMatcher {
        let mut m = NlpMatcher::new(entity_type, vec!["content".to_string()], tagger).unwrap();
        m.bind(candidate("").schema()).unwrap();
        m
    }

    fn summary(spans: &[Span]) -> Vec<(&str, usize, usize, usize)> {
        spans
            .iter()
            .map(|s| (s.value(), s.start(), s.end(), s.token_offset()))
            .collect()
    }

    #[test]
    fn test_selector_wire_tokens_and_modes() -> anyhow::Result<()> {
        for selector in NlpEntityType::ALL {
            assert_eq!(selector.as_str().parse::<NlpEntityType>()?, selector);
            assert_eq!(serde_json::to_string(&selector)?, format!("\"{}\"", selector));
        }
        assert_eq!(NlpEntityType::Verb.mode(), TaggerMode::PartOfSpeech);
        assert_eq!(NlpEntityType::NeAll.mode(), TaggerMode::NamedEntity);
        assert!(NlpEntityType::NeAll.accepts(NlpEntityType::Money));
        assert!(!NlpEntityType::NeAll.accepts(NlpEntityType::Noun));
        assert!("Person".parse::<NlpEntityType>().is_err());
        Ok(())
    }

    #[test]
    fn test_adjacent_entities_merge_into_phrase() -> anyhow::Result<()> {
        let tagger = Arc::new(
            LexiconTagger::new()
                .with_entity("alice", NlpEntityType::Person)
                .with_entity("smith", NlpEntityType::Person)
                .with_entity("paris", NlpEntityType::Location),
        );
        let text = candidate("Alice Smith visited Paris");

        let spans = matcher(NlpEntityType::Person, tagger.clone())
            .evaluate(&text)?
            .expect("should match");
        assert_eq!(summary(&spans), vec![("Alice Smith", 0, 11, 0)]);

        let spans = matcher(NlpEntityType::NeAll, tagger.clone())
            .evaluate(&text)?
            .expect("should match");
        assert_eq!(
            summary(&spans),
            vec![("Alice Smith", 0, 11, 0), ("Paris", 20, 25, 3)]
        );

        assert!(matcher(NlpEntityType::Money, tagger).evaluate(&text)?.is_none());
        Ok(())
    }

    #[test]
    fn test_numeric_shapes_and_sentence_offsets() -> anyhow::Result<()> {
        let tagger: Arc<dyn Tagger> = Arc::new(LexiconTagger::new());
        let text = candidate("Paid $40 on Monday. Rates rose 15% today.");

        let money = matcher(NlpEntityType::Money, tagger.clone())
            .evaluate(&text)?
            .expect("money");
        assert_eq!(summary(&money), vec![("40", 6, 8, 1)]);

        let percent = matcher(NlpEntityType::Percent, tagger.clone())
            .evaluate(&text)?
            .expect("percent");
        assert_eq!(summary(&percent), vec![("15", 31, 33, 2)]);

        let dates = matcher(NlpEntityType::Date, tagger)
            .evaluate(&text)?
            .expect("dates");
        assert_eq!(
            summary(&dates),
            vec![("Monday", 12, 18, 3), ("today", 35, 40, 3)]
        );
        Ok(())
    }

    #[test]
    fn test_organization_suffix_claims_preceding_words() -> anyhow::Result<()> {
        let tagger: Arc<dyn Tagger> = Arc::new(LexiconTagger::new());
        let spans = matcher(NlpEntityType::Organization, tagger)
            .evaluate(&candidate("She works at Globex Corp now"))?
            .expect("should match");
        assert_eq!(summary(&spans), vec![("Globex Corp", 13, 24, 3)]);
        Ok(())
    }

    #[test]
    fn test_part_of_speech_tokens_are_not_merged() -> anyhow::Result<()> {
        let tagger: Arc<dyn Tagger> = Arc::new(LexiconTagger::new());
        let text = candidate("The quick fox quickly jumped");

        let adverbs = matcher(NlpEntityType::Adverb, tagger.clone())
            .evaluate(&text)?
            .expect("adverb");
        assert_eq!(summary(&adverbs), vec![("quickly", 14, 21, 3)]);

        let verbs = matcher(NlpEntityType::Verb, tagger.clone())
            .evaluate(&text)?
            .expect("verb");
        assert_eq!(summary(&verbs), vec![("jumped", 22, 28, 4)]);

        let nouns = matcher(NlpEntityType::Noun, tagger).evaluate(&text)?.expect("noun");
        assert_eq!(summary(&nouns), vec![("fox", 10, 13, 2)]);
        Ok(())
    }

    struct BrokenTagger;

    impl Tagger for BrokenTagger {
        fn tag(&self, _text: &str, _mode: TaggerMode) -> Result<Vec<TaggedToken>, DataError> {
            Err(DataError::Tagger("model not loaded".to_string()))
        }
    }

    #[test]
    fn test_tagger_failure_is_data_error() {
        let err = matcher(NlpEntityType::Person, Arc::new(BrokenTagger))
            .evaluate(&candidate("anything"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
