//! Text analysis shared by the index and the token-based matchers.
//!
//! An analyzer turns text into a token stream with offsets. The standard
//! analyzer lower-cases, splits on non-alphanumeric boundaries and can drop
//! English stop words. Token positions always count the removed words, so a
//! token's `position` is its index in the source token sequence.

use serde::{Deserialize, Serialize};

/// English stop words removed when stop-word filtering is enabled
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// One token of analyzed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Normalized (lower-cased) form used for matching
    pub term: String,
    /// The token as it appears in the source text
    pub text: String,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
    /// Index of the token in the source token sequence
    pub position: usize,
}

/// Tokenizer contract consumed by matchers and indexes
pub trait Analyzer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    /// Normalized terms only
    fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text).into_iter().map(|t| t.term).collect()
    }
}

/// Analyzer settings carried by matcher properties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub stop_words: bool,
}

impl AnalyzerConfig {
    pub fn build(&self) -> StandardAnalyzer {
        StandardAnalyzer {
            remove_stop_words: self.stop_words,
        }
    }
}

/// Lower-casing, alphanumeric-boundary tokenizer
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAnalyzer {
    remove_stop_words: bool,
}

impl StandardAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_words() -> Self {
        Self {
            remove_stop_words: true,
        }
    }
}

impl Analyzer for StandardAnalyzer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0;
        let mut current: Option<(usize, String)> = None;
        let mut char_index = 0;

        let mut flush = |start: usize, end: usize, word: String, tokens: &mut Vec<Token>| {
            let term = word.to_lowercase();
            if !(self.remove_stop_words && ENGLISH_STOP_WORDS.contains(&term.as_str())) {
                tokens.push(Token {
                    term,
                    text: word,
                    start,
                    end,
                    position,
                });
            }
            position += 1;
        };

        for c in text.chars() {
            if c.is_alphanumeric() {
                match current.as_mut() {
                    Some((_, word)) => word.push(c),
                    None => current = Some((char_index, c.to_string())),
                }
            } else if let Some((start, word)) = current.take() {
                flush(start, char_index, word, &mut tokens);
            }
            char_index += 1;
        }
        if let Some((start, word)) = current.take() {
            flush(start, char_index, word, &mut tokens);
        }

        tokens
    }
}

/// Token index at which a match starting at `char_offset` begins: the
/// position of the first token that ends after the offset.
pub fn token_offset_at(tokens: &[Token], char_offset: usize) -> usize {
    tokens
        .iter()
        .find(|t| t.end > char_offset)
        .or(tokens.last())
        .map_or(0, |t| {
            if t.end > char_offset {
                t.position
            } else {
                t.position + 1
            }
        })
}

/// Convert a byte index into `text` to a character offset
pub fn char_offset(text: &str, byte_index: usize) -> usize {
    text[..byte_index].chars().count()
}
