//! Nested loop join with inner and outer variants.
//!
//! The left input is the inner side and the right input the outer side. The
//! outer side is materialized when the join opens; each inner tuple is then
//! compared with every outer tuple in order.
//!
//! Merged tuples are laid out as:
//! `[_id] ++ inner attributes ++ outer attributes ++ [spanList]`
//! where reserved attributes are taken out of both sides, `_id` is present
//! (with a fresh value) if either side carries one, `spanList` concatenates
//! both sides' spans, and `payload` is not carried over.
//!
//! An equality join drops the outer join attribute in favour of the inner
//! one, since both hold the same value. A similarity join keeps it, renamed
//! to `<name>_outer` when the inner side already has that name. Any other
//! name occurring on both sides is rejected when the join is built.

use crate::analyzer::{Analyzer, StandardAnalyzer};
use crate::data::{
    Attribute, Schema, Span, Tuple, Value, ID_ATTRIBUTE, SPAN_LIST_ATTRIBUTE,
};
use crate::error::{DataError, EngineError, EngineResult, PlanError};
use crate::operator::{
    close_after_failure, close_children, collect_tuples, open_children, BoxedOperator, Lifecycle,
    Operator,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    #[serde(rename = "inner")]
    Inner,
    #[serde(rename = "left outer")]
    LeftOuter,
    #[serde(rename = "right outer")]
    RightOuter,
    #[serde(rename = "full outer")]
    FullOuter,
}

impl JoinType {
    pub const ALL: [JoinType; 4] = [
        JoinType::Inner,
        JoinType::LeftOuter,
        JoinType::RightOuter,
        JoinType::FullOuter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::LeftOuter => "left outer",
            JoinType::RightOuter => "right outer",
            JoinType::FullOuter => "full outer",
        }
    }

    /// Whether inner tuples without a partner are emitted with NULLs
    pub fn keeps_unmatched_inner(&self) -> bool {
        matches!(self, JoinType::LeftOuter | JoinType::FullOuter)
    }

    /// Whether outer tuples without a partner are emitted with NULLs
    pub fn keeps_unmatched_outer(&self) -> bool {
        matches!(self, JoinType::RightOuter | JoinType::FullOuter)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinType {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JoinType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PlanError::UnknownToken {
                vocabulary: "join type",
                value: s.to_string(),
            })
    }
}

/// Where one output field comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSource {
    FreshId,
    Inner(usize),
    Outer(usize),
    /// The join value: the inner side's, or the outer side's when the inner
    /// side is missing or NULL
    JoinKey,
    Spans,
}

/// Output schema of a join and the recipe for merging two tuples into it
#[derive(Debug, Clone)]
pub struct JoinLayout {
    schema: Arc<Schema>,
    sources: Vec<FieldSource>,
    inner_key: usize,
    outer_key: usize,
}

/// Suffix given to a kept outer join attribute whose name the inner side uses
pub const OUTER_KEY_SUFFIX: &str = "_outer";

impl JoinLayout {
    /// Layout with a single, coalesced join column
    pub fn new(
        inner: &Schema,
        inner_attribute: &str,
        outer: &Schema,
        outer_attribute: &str,
    ) -> Result<Self, PlanError> {
        Self::build(inner, inner_attribute, outer, outer_attribute, false)
    }

    /// Layout carrying both join values, for predicates under which they differ
    pub fn keeping_outer_key(
        inner: &Schema,
        inner_attribute: &str,
        outer: &Schema,
        outer_attribute: &str,
    ) -> Result<Self, PlanError> {
        Self::build(inner, inner_attribute, outer, outer_attribute, true)
    }

    fn build(
        inner: &Schema,
        inner_attribute: &str,
        outer: &Schema,
        outer_attribute: &str,
        keep_outer_key: bool,
    ) -> Result<Self, PlanError> {
        let inner_key = inner.position(inner_attribute)?;
        let outer_key = outer.position(outer_attribute)?;
        let inner_type = inner.attributes()[inner_key].attribute_type();
        let outer_type = outer.attributes()[outer_key].attribute_type();
        if inner_type != outer_type {
            return Err(PlanError::JoinTypeMismatch {
                inner: inner_attribute.to_string(),
                inner_type,
                outer: outer_attribute.to_string(),
                outer_type,
            });
        }

        let mut attributes = Vec::new();
        let mut sources = Vec::new();

        if inner.contains(ID_ATTRIBUTE) || outer.contains(ID_ATTRIBUTE) {
            attributes.push(Attribute::id());
            sources.push(FieldSource::FreshId);
        }
        for (position, attribute) in inner.attributes().iter().enumerate() {
            if attribute.is_reserved() {
                continue;
            }
            attributes.push(attribute.clone());
            sources.push(if position == inner_key && !keep_outer_key {
                FieldSource::JoinKey
            } else {
                FieldSource::Inner(position)
            });
        }
        for (position, attribute) in outer.attributes().iter().enumerate() {
            if attribute.is_reserved() || (position == outer_key && !keep_outer_key) {
                continue;
            }
            if position == outer_key && inner.contains(attribute.name()) {
                attributes.push(Attribute::new(
                    format!("{}{}", attribute.name(), OUTER_KEY_SUFFIX),
                    attribute.attribute_type(),
                ));
            } else {
                attributes.push(attribute.clone());
            }
            sources.push(FieldSource::Outer(position));
        }
        if inner.contains(SPAN_LIST_ATTRIBUTE) || outer.contains(SPAN_LIST_ATTRIBUTE) {
            attributes.push(Attribute::span_list());
            sources.push(FieldSource::Spans);
        }

        Ok(Self {
            schema: Arc::new(Schema::new(attributes)?),
            sources,
            inner_key,
            outer_key,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Join values of the two sides
    fn keys<'a>(&self, inner: &'a Tuple, outer: &'a Tuple) -> (&'a Value, &'a Value) {
        (&inner.fields()[self.inner_key], &outer.fields()[self.outer_key])
    }

    /// Build an output tuple; a missing side contributes NULLs
    pub fn merge(&self, inner: Option<&Tuple>, outer: Option<&Tuple>) -> EngineResult<Tuple> {
        let field = |tuple: Option<&Tuple>, position: usize| {
            tuple.map_or(Value::Null, |t| t.fields()[position].clone())
        };

        let fields = self
            .sources
            .iter()
            .map(|source| match *source {
                FieldSource::FreshId => Value::Id(Uuid::new_v4()),
                FieldSource::Inner(position) => field(inner, position),
                FieldSource::Outer(position) => field(outer, position),
                FieldSource::JoinKey => match field(inner, self.inner_key) {
                    Value::Null => field(outer, self.outer_key),
                    value => value,
                },
                FieldSource::Spans => {
                    let spans: Vec<Span> = [inner, outer]
                        .into_iter()
                        .flatten()
                        .flat_map(|t| t.spans(SPAN_LIST_ATTRIBUTE).iter().cloned())
                        .collect();
                    Value::List(spans)
                }
            })
            .collect();
        Tuple::new(self.schema.clone(), fields).map_err(EngineError::from)
    }
}

/// Join condition between one inner and one outer attribute
pub trait JoinPredicate: Send {
    fn inner_attribute(&self) -> &str;

    fn outer_attribute(&self) -> &str;

    /// Validate both inputs and lay out the merged tuples
    fn layout(&self, inner: &Schema, outer: &Schema) -> Result<JoinLayout, PlanError> {
        JoinLayout::new(inner, self.inner_attribute(), outer, self.outer_attribute())
    }

    /// Whether two non-NULL join values satisfy the condition
    fn matches(&self, inner: &Value, outer: &Value) -> Result<bool, DataError>;
}

/// Join on equal attribute values
#[derive(Debug, Clone)]
pub struct EqualityJoinPredicate {
    inner_attribute: String,
    outer_attribute: String,
}

impl EqualityJoinPredicate {
    pub fn new(inner_attribute: impl Into<String>, outer_attribute: impl Into<String>) -> Self {
        Self {
            inner_attribute: inner_attribute.into(),
            outer_attribute: outer_attribute.into(),
        }
    }
}

impl JoinPredicate for EqualityJoinPredicate {
    fn inner_attribute(&self) -> &str {
        &self.inner_attribute
    }

    fn outer_attribute(&self) -> &str {
        &self.outer_attribute
    }

    fn matches(&self, inner: &Value, outer: &Value) -> Result<bool, DataError> {
        Ok(inner.compare(outer)? == Ordering::Equal)
    }
}

/// Join on token-set Jaccard similarity of two text attributes
#[derive(Debug, Clone)]
pub struct SimilarityJoinPredicate {
    inner_attribute: String,
    outer_attribute: String,
    threshold: f64,
    analyzer: StandardAnalyzer,
}

impl SimilarityJoinPredicate {
    pub fn new(
        inner_attribute: impl Into<String>,
        outer_attribute: impl Into<String>,
        threshold: f64,
    ) -> Result<Self, PlanError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(PlanError::invalid(
                "similarityThreshold",
                format!("{} is outside (0, 1]", threshold),
            ));
        }
        Ok(Self {
            inner_attribute: inner_attribute.into(),
            outer_attribute: outer_attribute.into(),
            threshold,
            analyzer: StandardAnalyzer::new(),
        })
    }

    /// |A ∩ B| / |A ∪ B| over the two token sets; 0 when both are empty
    pub fn similarity(&self, left: &str, right: &str) -> f64 {
        let left: HashSet<String> = self.analyzer.terms(left).into_iter().collect();
        let right: HashSet<String> = self.analyzer.terms(right).into_iter().collect();
        let union = left.union(&right).count();
        if union == 0 {
            return 0.0;
        }
        left.intersection(&right).count() as f64 / union as f64
    }
}

impl JoinPredicate for SimilarityJoinPredicate {
    fn inner_attribute(&self) -> &str {
        &self.inner_attribute
    }

    fn outer_attribute(&self) -> &str {
        &self.outer_attribute
    }

    fn layout(&self, inner: &Schema, outer: &Schema) -> Result<JoinLayout, PlanError> {
        inner.typed_position(&self.inner_attribute, "string or text", |t| t.is_textual())?;
        outer.typed_position(&self.outer_attribute, "string or text", |t| t.is_textual())?;
        JoinLayout::keeping_outer_key(inner, &self.inner_attribute, outer, &self.outer_attribute)
    }

    fn matches(&self, inner: &Value, outer: &Value) -> Result<bool, DataError> {
        match (inner.as_str(), outer.as_str()) {
            (Some(left), Some(right)) => Ok(self.similarity(left, right) >= self.threshold),
            _ => Err(DataError::Incomparable {
                left: inner.type_name(),
                right: outer.type_name(),
            }),
        }
    }
}

/// Join operator
pub struct Join {
    lifecycle: Lifecycle,
    /// Left (inner) child
    inner: BoxedOperator,
    /// Right (outer) child
    outer: BoxedOperator,
    join_type: JoinType,
    predicate: Box<dyn JoinPredicate>,
    layout: JoinLayout,
    /// Materialized outer tuples
    outer_tuples: Vec<Tuple>,
    /// Which outer tuples found a partner
    outer_matched: Vec<bool>,
    /// Inner tuple currently being compared, with whether it found a partner
    current: Option<(Tuple, bool)>,
    /// Next outer tuple to compare with `current`
    outer_cursor: usize,
    inner_exhausted: bool,
    /// Next outer tuple to consider for unmatched emission
    unmatched_cursor: usize,
}

impl Join {
    pub fn new(
        inner: BoxedOperator,
        outer: BoxedOperator,
        join_type: JoinType,
        predicate: Box<dyn JoinPredicate>,
    ) -> Result<Self, PlanError> {
        let layout = predicate.layout(inner.output_schema(), outer.output_schema())?;
        Ok(Self {
            lifecycle: Lifecycle::new("join"),
            inner,
            outer,
            join_type,
            predicate,
            layout,
            outer_tuples: Vec::new(),
            outer_matched: Vec::new(),
            current: None,
            outer_cursor: 0,
            inner_exhausted: false,
            unmatched_cursor: 0,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    fn reset(&mut self) {
        self.outer_tuples = Vec::new();
        self.outer_matched = Vec::new();
        self.current = None;
        self.outer_cursor = 0;
        self.inner_exhausted = false;
        self.unmatched_cursor = 0;
    }

    fn keys_match(&self, inner: &Tuple, outer: &Tuple) -> Result<bool, DataError> {
        match self.layout.keys(inner, outer) {
            (Value::Null, _) | (_, Value::Null) => Ok(false),
            (left, right) => self.predicate.matches(left, right),
        }
    }

    fn advance(&mut self) -> EngineResult<Option<Tuple>> {
        while !self.inner_exhausted {
            let Some((inner, matched)) = self.current.take() else {
                match self.inner.next_tuple()? {
                    Some(tuple) => {
                        self.current = Some((tuple, false));
                        self.outer_cursor = 0;
                    }
                    None => self.inner_exhausted = true,
                }
                continue;
            };

            while self.outer_cursor < self.outer_tuples.len() {
                let index = self.outer_cursor;
                self.outer_cursor += 1;
                if self.keys_match(&inner, &self.outer_tuples[index])? {
                    self.outer_matched[index] = true;
                    let merged = self.layout.merge(Some(&inner), Some(&self.outer_tuples[index]));
                    self.current = Some((inner, true));
                    return merged.map(Some);
                }
            }

            if !matched && self.join_type.keeps_unmatched_inner() {
                return self.layout.merge(Some(&inner), None).map(Some);
            }
        }

        if self.join_type.keeps_unmatched_outer() {
            while self.unmatched_cursor < self.outer_tuples.len() {
                let index = self.unmatched_cursor;
                self.unmatched_cursor += 1;
                if !self.outer_matched[index] {
                    return self.layout.merge(None, Some(&self.outer_tuples[index])).map(Some);
                }
            }
        }
        Ok(None)
    }
}

impl Operator for Join {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        open_children(&mut [&mut self.inner, &mut self.outer]).map_err(|e| self.lifecycle.wrap(e))?;

        self.reset();
        match collect_tuples(&mut *self.outer) {
            Ok(tuples) => {
                self.outer_matched = vec![false; tuples.len()];
                self.outer_tuples = tuples;
            }
            Err(e) => {
                close_after_failure(&mut self.inner);
                close_after_failure(&mut self.outer);
                return Err(self.lifecycle.wrap(e));
            }
        }
        log::debug!(
            "join '{}' materialized {} outer tuples",
            self.lifecycle.id(),
            self.outer_tuples.len()
        );
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;
        self.advance().map_err(|e| self.lifecycle.wrap(e))
    }

    fn close(&mut self) -> EngineResult<()> {
        if self.lifecycle.mark_closed() {
            self.reset();
        }
        close_children(&mut [&mut self.inner, &mut self.outer]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        self.layout.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AttributeType;
    use crate::operator::testing::{run, string, text, MockSource};

    fn left() -> MockSource {
        MockSource::new(
            &[("id", AttributeType::Integer), ("letter", AttributeType::String)],
            vec![
                vec![Value::Integer(1), string("a")],
                vec![Value::Integer(2), string("b")],
            ],
        )
        .named("left")
    }

    fn right(rows: Vec<(i32, &str)>) -> MockSource {
        MockSource::new(
            &[("id", AttributeType::Integer), ("label", AttributeType::String)],
            rows.into_iter()
                .map(|(id, label)| vec![Value::Integer(id), string(label)])
                .collect(),
        )
        .named("right")
    }

    fn join(join_type: JoinType, right_rows: Vec<(i32, &str)>) -> Join {
        Join::new(
            Box::new(left()),
            Box::new(right(right_rows)),
            join_type,
            Box::new(EqualityJoinPredicate::new("id", "id")),
        )
        .unwrap()
    }

    fn rows(tuples: &[Tuple]) -> Vec<Vec<Value>> {
        tuples.iter().map(|t| t.fields().to_vec()).collect()
    }

    #[test]
    fn test_join_type_wire_tokens() -> anyhow::Result<()> {
        for join_type in JoinType::ALL {
            assert_eq!(join_type.as_str().parse::<JoinType>()?, join_type);
            assert_eq!(serde_json::to_string(&join_type)?, format!("\"{}\"", join_type));
        }
        assert!("left_outer".parse::<JoinType>().is_err());
        Ok(())
    }

    #[test]
    fn test_inner_join() -> anyhow::Result<()> {
        let mut join = join(JoinType::Inner, vec![(1, "x")]);
        let names: Vec<_> = join.output_schema().names().collect();
        assert_eq!(names, vec!["id", "letter", "label"]);

        let tuples = run(&mut join)?;
        assert_eq!(
            rows(&tuples),
            vec![vec![Value::Integer(1), string("a"), string("x")]]
        );
        assert_eq!(tuples[0].schema(), join.output_schema());
        Ok(())
    }

    #[test]
    fn test_left_outer_join() -> anyhow::Result<()> {
        let mut join = join(JoinType::LeftOuter, vec![(1, "x")]);
        let tuples = run(&mut join)?;
        assert_eq!(
            rows(&tuples),
            vec![
                vec![Value::Integer(1), string("a"), string("x")],
                vec![Value::Integer(2), string("b"), Value::Null],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_right_and_full_outer_join() -> anyhow::Result<()> {
        let mut right_join = join(JoinType::RightOuter, vec![(1, "x"), (3, "z")]);
        assert_eq!(
            rows(&run(&mut right_join)?),
            vec![
                vec![Value::Integer(1), string("a"), string("x")],
                vec![Value::Integer(3), Value::Null, string("z")],
            ]
        );

        let mut full_join = join(JoinType::FullOuter, vec![(1, "x"), (3, "z")]);
        assert_eq!(
            rows(&run(&mut full_join)?),
            vec![
                vec![Value::Integer(1), string("a"), string("x")],
                vec![Value::Integer(2), string("b"), Value::Null],
                vec![Value::Integer(3), Value::Null, string("z")],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_every_partner_is_emitted() -> anyhow::Result<()> {
        let mut join = join(JoinType::Inner, vec![(1, "x"), (1, "y"), (2, "z")]);
        let labels: Vec<_> = run(&mut join)?
            .iter()
            .map(|t| t.fields()[2].clone())
            .collect();
        assert_eq!(labels, vec![string("x"), string("y"), string("z")]);
        Ok(())
    }

    #[test]
    fn test_null_keys_never_match() -> anyhow::Result<()> {
        let inner = MockSource::new(&[("k", AttributeType::Integer)], vec![vec![Value::Null]]);
        let outer = MockSource::new(
            &[("k", AttributeType::Integer), ("v", AttributeType::Integer)],
            vec![vec![Value::Null, Value::Integer(9)]],
        );
        let mut join = Join::new(
            Box::new(inner),
            Box::new(outer),
            JoinType::FullOuter,
            Box::new(EqualityJoinPredicate::new("k", "k")),
        )?;
        assert_eq!(
            rows(&run(&mut join)?),
            vec![
                vec![Value::Null, Value::Null],
                vec![Value::Null, Value::Integer(9)],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_construction_errors() {
        let mismatch = MockSource::new(
            &[("id", AttributeType::Long), ("label", AttributeType::String)],
            vec![],
        );
        let result = Join::new(
            Box::new(left()),
            Box::new(mismatch),
            JoinType::Inner,
            Box::new(EqualityJoinPredicate::new("id", "id")),
        );
        assert!(matches!(result, Err(PlanError::JoinTypeMismatch { .. })));

        let collision = MockSource::new(
            &[("id", AttributeType::Integer), ("letter", AttributeType::String)],
            vec![],
        );
        let result = Join::new(
            Box::new(left()),
            Box::new(collision),
            JoinType::Inner,
            Box::new(EqualityJoinPredicate::new("id", "id")),
        );
        assert!(matches!(result, Err(PlanError::DuplicateAttribute { .. })));

        let result = Join::new(
            Box::new(left()),
            Box::new(right(vec![])),
            JoinType::Inner,
            Box::new(EqualityJoinPredicate::new("id", "missing")),
        );
        assert!(matches!(result, Err(PlanError::AttributeNotFound { .. })));
    }

    #[test]
    fn test_reserved_attributes_are_combined() -> anyhow::Result<()> {
        let span_schema = |name: &str| {
            Schema::new(vec![
                Attribute::id(),
                Attribute::new("k", AttributeType::Integer),
                Attribute::new(name, AttributeType::Text),
                Attribute::payload(),
                Attribute::span_list(),
            ])
            .unwrap()
        };
        let row = |content: &str, span: Span| {
            vec![
                Value::Id(Uuid::new_v4()),
                Value::Integer(1),
                text(content),
                Value::List(vec![]),
                Value::List(vec![span]),
            ]
        };
        let inner = MockSource::with_schema(
            span_schema("title"),
            vec![row("rust", Span::new("title", "rust", 0, 4, 0))],
        );
        let outer = MockSource::with_schema(
            span_schema("body"),
            vec![row("go", Span::new("body", "go", 0, 2, 0))],
        );

        let mut join = Join::new(
            Box::new(inner),
            Box::new(outer),
            JoinType::Inner,
            Box::new(EqualityJoinPredicate::new("k", "k")),
        )?;
        let names: Vec<_> = join.output_schema().names().collect();
        assert_eq!(names, vec!["_id", "k", "title", "body", "spanList"]);

        let tuples = run(&mut join)?;
        let spans: Vec<_> = tuples[0].spans("spanList").iter().map(Span::key).collect();
        assert_eq!(spans, vec!["title", "body"]);
        assert!(matches!(tuples[0].fields()[0], Value::Id(_)));
        Ok(())
    }

    #[test]
    fn test_similarity_join() -> anyhow::Result<()> {
        let predicate = SimilarityJoinPredicate::new("name", "name", 0.5)?;
        assert!((predicate.similarity("New York City", "new york") - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(predicate.similarity("", ""), 0.0);

        let inner = MockSource::new(
            &[("name", AttributeType::String)],
            vec![vec![string("New York City")], vec![string("Boston")]],
        );
        let outer = MockSource::new(
            &[("name", AttributeType::String), ("state", AttributeType::String)],
            vec![vec![string("new york"), string("NY")]],
        );
        let mut join = Join::new(
            Box::new(inner),
            Box::new(outer),
            JoinType::Inner,
            Box::new(predicate),
        )?;
        let names: Vec<_> = join.output_schema().names().collect();
        assert_eq!(names, vec!["name", "name_outer", "state"]);
        assert_eq!(
            rows(&run(&mut join)?),
            vec![vec![string("New York City"), string("new york"), string("NY")]]
        );

        assert!(SimilarityJoinPredicate::new("a", "b", 0.0).is_err());
        Ok(())
    }

    #[test]
    fn test_similarity_join_keeps_both_sides_unmatched() -> anyhow::Result<()> {
        let inner = MockSource::new(
            &[("city", AttributeType::Text)],
            vec![vec![text("Boston")]],
        );
        let outer = MockSource::new(
            &[("place", AttributeType::Text)],
            vec![vec![text("new york")]],
        );
        let mut join = Join::new(
            Box::new(inner),
            Box::new(outer),
            JoinType::FullOuter,
            Box::new(SimilarityJoinPredicate::new("city", "place", 0.5)?),
        )?;
        let names: Vec<_> = join.output_schema().names().collect();
        assert_eq!(names, vec!["city", "place"]);
        assert_eq!(
            rows(&run(&mut join)?),
            vec![
                vec![text("Boston"), Value::Null],
                vec![Value::Null, text("new york")],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_failures_are_wrapped_and_inputs_closed() {
        let inner = left();
        let inner_tracker = inner.tracker();
        let outer = right(vec![(1, "x")]).failing_at(0);
        let mut join = Join::new(
            Box::new(inner),
            Box::new(outer),
            JoinType::Inner,
            Box::new(EqualityJoinPredicate::new("id", "id")),
        )
        .unwrap()
        .with_id("j");

        let err = join.open().unwrap_err();
        assert_eq!(err.operator_chain(), vec!["j", "right"]);
        assert!(!inner_tracker.is_open());
        assert!(join.close().is_ok());
    }

    #[test]
    fn test_double_close() -> anyhow::Result<()> {
        let inner = left();
        let tracker = inner.tracker();
        let mut join = join_with(inner);
        join.open()?;
        join.next_tuple()?;
        join.close()?;
        join.close()?;
        assert_eq!(tracker.releases(), 1);
        Ok(())
    }

    fn join_with(inner: MockSource) -> Join {
        Join::new(
            Box::new(inner),
            Box::new(right(vec![(1, "x")])),
            JoinType::Inner,
            Box::new(EqualityJoinPredicate::new("id", "id")),
        )
        .unwrap()
    }
}
