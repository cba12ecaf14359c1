//! Match filter operator.
//!
//! Pulls tuples from its child and keeps those the configured matcher
//! accepts. Span-producing matchers record their spans in `spanList`: the
//! attribute is appended when the input has none and extended otherwise.

use crate::data::{Attribute, AttributeType, Schema, Span, Tuple, Value, SPAN_LIST_ATTRIBUTE};
use crate::error::{EngineResult, PlanError};
use crate::matcher::Matcher;
use crate::operator::{close_after_failure, close_children, BoxedOperator, Lifecycle, Operator};
use std::sync::Arc;

/// Where accepted spans go in the output tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanSlot {
    /// The matcher produces no spans; tuples pass through unchanged
    None,
    /// `spanList` is appended as the last attribute
    Append,
    /// The input already carries `spanList` at this position
    Extend(usize),
}

/// Operator that filters tuples with a [`Matcher`]
pub struct MatchFilter {
    lifecycle: Lifecycle,
    /// Child operator that produces tuples
    child: BoxedOperator,
    matcher: Box<dyn Matcher>,
    slot: SpanSlot,
    output_schema: Arc<Schema>,
    /// Whether `matcher.open()` succeeded and has not been undone
    matcher_open: bool,
}

impl MatchFilter {
    /// Bind `matcher` to the child's schema and derive the output schema
    pub fn new(child: BoxedOperator, mut matcher: Box<dyn Matcher>) -> Result<Self, PlanError> {
        let input = child.output_schema().clone();
        matcher.bind(&input)?;

        let (slot, output_schema) = if !matcher.produces_spans() {
            (SpanSlot::None, input)
        } else if let Some(index) = input.index_of(SPAN_LIST_ATTRIBUTE) {
            let actual = input.attributes()[index].attribute_type();
            if actual != AttributeType::List {
                return Err(PlanError::AttributeTypeMismatch {
                    attribute: SPAN_LIST_ATTRIBUTE.to_string(),
                    expected: AttributeType::List.to_string(),
                    actual,
                });
            }
            (SpanSlot::Extend(index), input)
        } else {
            (SpanSlot::Append, Arc::new(input.append(Attribute::span_list())?))
        };

        Ok(Self {
            lifecycle: Lifecycle::new(matcher.name()),
            child,
            matcher,
            slot,
            output_schema,
            matcher_open: false,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.lifecycle.set_id(id);
        self
    }

    fn emit(&self, tuple: Tuple, spans: Vec<Span>) -> EngineResult<Tuple> {
        let fields = match self.slot {
            SpanSlot::None => return Ok(tuple),
            SpanSlot::Append => {
                let mut fields = tuple.into_fields();
                fields.push(Value::List(spans));
                fields
            }
            SpanSlot::Extend(index) => {
                let mut fields = tuple.into_fields();
                match &mut fields[index] {
                    Value::List(existing) => existing.extend(spans),
                    slot => *slot = Value::List(spans),
                }
                fields
            }
        };
        Ok(Tuple::new(self.output_schema.clone(), fields)?)
    }
}

impl Operator for MatchFilter {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    fn open(&mut self) -> EngineResult<()> {
        self.lifecycle.check_closed()?;
        self.child.open().map_err(|e| self.lifecycle.wrap(e))?;

        if let Err(e) = self.matcher.open() {
            close_after_failure(&mut self.child);
            return Err(self.lifecycle.wrap(e));
        }
        self.matcher_open = true;
        self.lifecycle.mark_opened();
        Ok(())
    }

    fn next_tuple(&mut self) -> EngineResult<Option<Tuple>> {
        self.lifecycle.check_open()?;

        // Keep pulling until the matcher accepts a tuple
        loop {
            let Some(tuple) = self.child.next_tuple().map_err(|e| self.lifecycle.wrap(e))? else {
                return Ok(None);
            };
            let accepted = self
                .matcher
                .evaluate(&tuple)
                .map_err(|e| self.lifecycle.wrap(e))?;
            if let Some(spans) = accepted {
                return self
                    .emit(tuple, spans)
                    .map(Some)
                    .map_err(|e| self.lifecycle.wrap(e));
            }
        }
    }

    fn close(&mut self) -> EngineResult<()> {
        self.lifecycle.mark_closed();
        if self.matcher_open {
            self.matcher.close();
            self.matcher_open = false;
        }
        close_children(&mut [&mut self.child]).map_err(|e| self.lifecycle.wrap(e))
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerConfig;
    use crate::matcher::{
        ComparablePredicate, ComparisonType, KeywordMatcher, KeywordMatchingType, RegexMatcher,
    };
    use crate::operator::testing::{run, string, text, MockSource};

    fn articles() -> MockSource {
        MockSource::new(
            &[("title", AttributeType::String), ("content", AttributeType::Text)],
            vec![
                vec![string("one"), text("an appointment for a book")],
                vec![string("two"), text("bookstore appointment")],
                vec![string("three"), text("book the appointment")],
            ],
        )
        .named("articles")
    }

    fn keyword(query: &str) -> Box<dyn Matcher> {
        Box::new(
            KeywordMatcher::new(
                query,
                vec!["content".to_string()],
                KeywordMatchingType::Conjunction,
                AnalyzerConfig::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_keyword_filter_appends_span_list() -> anyhow::Result<()> {
        let mut filter =
            MatchFilter::new(Box::new(articles()), keyword("book appointment"))?.with_id("kw");

        let names: Vec<_> = filter.output_schema().names().collect();
        assert_eq!(names, vec!["title", "content", "spanList"]);

        let tuples = run(&mut filter)?;
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].get(0), Some(&string("one")));
        assert_eq!(tuples[0].spans("spanList").len(), 2);
        assert_eq!(tuples[1].get(0), Some(&string("three")));

        // declared schema equals the schema of produced tuples
        assert_eq!(tuples[0].schema(), filter.output_schema());
        Ok(())
    }

    #[test]
    fn test_chained_filters_extend_span_list() -> anyhow::Result<()> {
        let first = MatchFilter::new(Box::new(articles()), keyword("book"))?;
        let regex = RegexMatcher::new("appoint", vec!["content".to_string()], false)?;
        let mut second = MatchFilter::new(Box::new(first), Box::new(regex))?;

        assert_eq!(second.output_schema().len(), 3);
        let tuples = run(&mut second)?;
        assert_eq!(tuples.len(), 2);
        let values: Vec<_> = tuples[0].spans("spanList").iter().map(Span::value).collect();
        assert_eq!(values, vec!["book", "appoint"]);
        Ok(())
    }

    #[test]
    fn test_comparable_keeps_schema() -> anyhow::Result<()> {
        let source = MockSource::new(
            &[("age", AttributeType::Integer)],
            vec![
                vec![Value::Integer(20)],
                vec![Value::Null],
                vec![Value::Integer(40)],
            ],
        );
        let predicate =
            ComparablePredicate::new("age", ComparisonType::GreaterThan, Value::Integer(30))?;
        let mut filter = MatchFilter::new(Box::new(source), Box::new(predicate))?;

        assert_eq!(filter.output_schema().len(), 1);
        let tuples = run(&mut filter)?;
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].get(0), Some(&Value::Integer(40)));
        Ok(())
    }

    #[test]
    fn test_unknown_attribute_rejected_at_construction() {
        let predicate =
            ComparablePredicate::new("missing", ComparisonType::EqualTo, Value::Integer(1)).unwrap();
        let result = MatchFilter::new(Box::new(articles()), Box::new(predicate));
        assert!(matches!(result, Err(PlanError::AttributeNotFound { .. })));
    }

    #[test]
    fn test_child_errors_are_wrapped() -> anyhow::Result<()> {
        let mut filter =
            MatchFilter::new(Box::new(articles().failing_at(1)), keyword("book"))?.with_id("kw");
        filter.open()?;
        assert!(filter.next_tuple()?.is_some());
        let err = filter.next_tuple().unwrap_err();
        assert_eq!(err.operator_chain(), vec!["kw", "articles"]);
        filter.close()?;
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> anyhow::Result<()> {
        let source = articles();
        let tracker = source.tracker();
        let mut filter = MatchFilter::new(Box::new(source), keyword("book"))?;
        filter.open()?;
        filter.next_tuple()?;
        filter.close()?;
        filter.close()?;
        assert_eq!(tracker.releases(), 1);
        assert!(!tracker.is_open());
        Ok(())
    }
}
