use serde::{Deserialize, Serialize};

/// Location of a match inside a field value.
///
/// `start` and `end` are character offsets into the source text (end
/// exclusive) and `token_offset` is the index of the token the match starts
/// at. Spans are created by matchers and only ever read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    key: String,
    value: String,
    start: usize,
    end: usize,
    token_offset: usize,
}

impl Span {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        start: usize,
        end: usize,
        token_offset: usize,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            start,
            end,
            token_offset,
        }
    }

    /// Label of the attribute (or query) that produced the match.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn token_offset(&self) -> usize {
        self.token_offset
    }

    /// Copy of this span carrying a different value label.
    pub fn relabeled(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self.clone()
        }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.key == other.key && self.start < other.end && other.start < self.end
    }
}
