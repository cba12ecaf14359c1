//! Behavioural guarantees of the operator library, exercised through the
//! public API only.

use anyhow::Result;
use textflow::analyzer::AnalyzerConfig;
use textflow::data::{Attribute, AttributeType, Schema, Span, Tuple, Value, ValueKey};
use textflow::error::PlanError;
use textflow::matcher::{FuzzyTokenMatcher, KeywordMatcher, KeywordMatchingType};
use std::sync::Arc;
use textflow::index::{Index, MemoryIndex};
use textflow::operator::{
    collect_tuples, AggregateFunction, AggregateSpec, Aggregator, BoxedOperator,
    EqualityJoinPredicate, Join, JoinType, JsonLinesSink, KeywordSource, Limit, MatchFilter,
    Operator, ProjectedField, Projection, ScanSource, Sort, SortCriteria, TupleSink, TupleSource,
};

fn schema(columns: &[(&str, AttributeType)]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|(name, t)| Attribute::new(*name, *t))
            .collect(),
    )
    .expect("test schema has unique names")
}

fn source(columns: &[(&str, AttributeType)], rows: Vec<Vec<Value>>) -> Result<BoxedOperator> {
    Ok(Box::new(TupleSource::new(schema(columns), rows)?))
}

fn documents(texts: &[&str]) -> Result<BoxedOperator> {
    source(
        &[("content", AttributeType::Text)],
        texts
            .iter()
            .map(|t| vec![Value::Text(t.to_string())])
            .collect(),
    )
}

fn run(operator: &mut dyn Operator) -> Result<Vec<Tuple>> {
    operator.open()?;
    let tuples = collect_tuples(operator)?;
    operator.close()?;
    Ok(tuples)
}

fn s(value: &str) -> Value {
    Value::String(value.to_string())
}

#[test]
fn test_schema_equality_is_structural() -> Result<()> {
    let a = schema(&[("id", AttributeType::Integer), ("name", AttributeType::String)]);
    let b = schema(&[("id", AttributeType::Integer), ("name", AttributeType::String)]);
    let reordered = schema(&[("name", AttributeType::String), ("id", AttributeType::Integer)]);
    let retyped = schema(&[("id", AttributeType::Long), ("name", AttributeType::String)]);

    assert_eq!(a, a);
    assert_eq!(a, b);
    assert_eq!(b, a);
    assert_ne!(a, reordered);
    assert_ne!(a, retyped);
    Ok(())
}

#[test]
fn test_identity_cannot_be_added_twice() -> Result<()> {
    let base = schema(&[("name", AttributeType::String)]);
    let once = base.with_id()?;
    assert_eq!(once.len(), 2);
    assert_eq!(once.attributes()[0], Attribute::id());

    assert!(matches!(
        once.with_id(),
        Err(PlanError::ReservedAttributePresent { name }) if name == "_id"
    ));
    Ok(())
}

#[test]
fn test_conjunction_matches_whole_tokens_in_any_order() -> Result<()> {
    let matcher = KeywordMatcher::new(
        "book appointment",
        vec!["content".to_string()],
        KeywordMatchingType::Conjunction,
        AnalyzerConfig::default(),
    )?;
    let mut filter = MatchFilter::new(
        documents(&["an appointment for a book", "bookstore appointment"])?,
        Box::new(matcher),
    )?;

    let results = run(&mut filter)?;
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].spans("spanList"),
        &[
            Span::new("content", "appointment", 3, 14, 1),
            Span::new("content", "book", 21, 25, 4),
        ]
    );
    Ok(())
}

#[test]
fn test_fuzzy_threshold_is_inclusive() -> Result<()> {
    let candidate = "quick brown fox jumps";
    for (threshold, expected) in [(0.75, 1), (0.80, 0)] {
        let matcher = FuzzyTokenMatcher::new(
            "the quick brown fox",
            vec!["content".to_string()],
            threshold,
            AnalyzerConfig::default(),
        )?;
        let mut filter = MatchFilter::new(documents(&[candidate])?, Box::new(matcher))?;
        assert_eq!(run(&mut filter)?.len(), expected, "threshold {}", threshold);
    }
    Ok(())
}

fn join_inputs() -> Result<(BoxedOperator, BoxedOperator)> {
    let left = source(
        &[("id", AttributeType::Integer), ("left", AttributeType::String)],
        vec![
            vec![Value::Integer(1), s("a")],
            vec![Value::Integer(2), s("b")],
        ],
    )?;
    let right = source(
        &[("id", AttributeType::Integer), ("right", AttributeType::String)],
        vec![vec![Value::Integer(1), s("x")]],
    )?;
    Ok((left, right))
}

#[test]
fn test_inner_and_left_outer_join() -> Result<()> {
    let (left, right) = join_inputs()?;
    let mut inner = Join::new(
        left,
        right,
        JoinType::Inner,
        Box::new(EqualityJoinPredicate::new("id", "id")),
    )?;
    let rows: Vec<_> = run(&mut inner)?.into_iter().map(Tuple::into_fields).collect();
    assert_eq!(rows, vec![vec![Value::Integer(1), s("a"), s("x")]]);

    let (left, right) = join_inputs()?;
    let mut outer = Join::new(
        left,
        right,
        JoinType::LeftOuter,
        Box::new(EqualityJoinPredicate::new("id", "id")),
    )?;
    let rows: Vec<_> = run(&mut outer)?.into_iter().map(Tuple::into_fields).collect();
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1), s("a"), s("x")],
            vec![Value::Integer(2), s("b"), Value::Null],
        ]
    );
    Ok(())
}

#[test]
fn test_value_keys_compare_by_value() {
    use std::collections::HashSet;

    let key = |d: f64| ValueKey(vec![s("k"), Value::Double(d)]);
    let keys: HashSet<_> = [key(0.0), key(-0.0), key(f64::NAN), key(f64::NAN), key(2.0)]
        .into_iter()
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&key(-0.0)));
    assert!(!keys.contains(&ValueKey(vec![s("k"), Value::Long(2)])));
}

#[test]
fn test_multi_key_sort_with_descending_tie_break() -> Result<()> {
    let people = source(
        &[("age", AttributeType::Integer), ("name", AttributeType::String)],
        vec![
            vec![Value::Integer(30), s("bob")],
            vec![Value::Integer(30), s("amy")],
            vec![Value::Integer(25), s("zed")],
        ],
    )?;
    let mut sort = Sort::new(
        people,
        vec![SortCriteria::asc("age"), SortCriteria::desc("name")],
    )?;
    let names: Vec<_> = run(&mut sort)?
        .iter()
        .map(|t| t.fields()[1].clone())
        .collect();
    assert_eq!(names, vec![s("zed"), s("bob"), s("amy")]);
    Ok(())
}

#[test]
fn test_declared_schema_matches_first_tuple() -> Result<()> {
    let scores = || {
        source(
            &[
                ("team", AttributeType::String),
                ("player", AttributeType::Text),
                ("score", AttributeType::Integer),
            ],
            vec![
                vec![s("red"), Value::Text("Ann Lee".to_string()), Value::Integer(7)],
                vec![s("blue"), Value::Text("Bo Kim".to_string()), Value::Integer(3)],
                vec![s("red"), Value::Text("Cy Ng".to_string()), Value::Integer(5)],
            ],
        )
    };

    let roster: Arc<dyn Index> = Arc::new(MemoryIndex::new(
        "roster",
        schema(&[
            ("team", AttributeType::String),
            ("player", AttributeType::Text),
            ("score", AttributeType::Integer),
        ]),
        vec![
            vec![s("red"), Value::Text("Ann Lee".to_string()), Value::Integer(7)],
            vec![s("blue"), Value::Text("Bo Kim".to_string()), Value::Integer(3)],
        ],
    )?);
    let with_payload = || -> Result<BoxedOperator> {
        Ok(Box::new(ScanSource::new(roster.clone())?.with_payload()?))
    };

    let keyword = KeywordMatcher::new(
        "kim",
        vec!["player".to_string()],
        KeywordMatchingType::Conjunction,
        AnalyzerConfig::default(),
    )?;
    let mut operators: Vec<BoxedOperator> = vec![
        scores()?,
        Box::new(ScanSource::new(roster.clone())?),
        with_payload()?,
        Box::new(KeywordSource::new(
            roster.clone(),
            "kim",
            vec!["player".to_string()],
            KeywordMatchingType::Conjunction,
            AnalyzerConfig::default(),
        )?),
        Box::new(KeywordSource::new(
            roster.clone(),
            "ann",
            vec!["player".to_string()],
            KeywordMatchingType::Substring,
            AnalyzerConfig::default(),
        )?),
        Box::new(TupleSink::new(with_payload()?)),
        Box::new(TupleSink::new(scores()?).with_limit(Some(1), 1)),
        Box::new(JsonLinesSink::new(with_payload()?, Box::new(std::io::sink()), "<discarded>")),
        Box::new(MatchFilter::new(scores()?, Box::new(keyword))?),
        Box::new(Projection::new(
            scores()?,
            vec![
                ProjectedField::new(2),
                ProjectedField::aliased(0, "side"),
                ProjectedField::aliased(2, "again"),
            ],
        )?),
        Box::new(Sort::new(scores()?, vec![SortCriteria::desc("score")])?),
        Box::new(Limit::new(scores()?, 1)),
        Box::new(Aggregator::new(
            scores()?,
            vec!["team".to_string()],
            vec![
                AggregateSpec::new(AggregateFunction::Sum, "score", "total"),
                AggregateSpec::new(AggregateFunction::Average, "score", "mean"),
                AggregateSpec::new(AggregateFunction::Concat, "player", "players"),
            ],
        )?),
        Box::new(Join::new(
            scores()?,
            sides(scores()?)?,
            JoinType::FullOuter,
            Box::new(EqualityJoinPredicate::new("team", "side")),
        )?),
    ];

    for operator in operators.iter_mut() {
        let declared = operator.output_schema().clone();
        operator.open()?;
        let first = operator
            .next_tuple()?
            .unwrap_or_else(|| panic!("'{}' produced nothing", operator.id()));
        operator.close()?;
        assert_eq!(**first.schema(), *declared, "operator '{}'", operator.id());
        assert_eq!(first.fields().len(), declared.len());
    }
    Ok(())
}

/// Scores with the team column renamed, so it can be joined against scores
fn sides(scores: BoxedOperator) -> Result<BoxedOperator> {
    Ok(Box::new(Projection::new(
        scores,
        vec![ProjectedField::aliased(0, "side"), ProjectedField::aliased(2, "points")],
    )?))
}

#[test]
fn test_closing_twice_is_harmless() -> Result<()> {
    let matcher = KeywordMatcher::new(
        "fox",
        vec!["content".to_string()],
        KeywordMatchingType::Conjunction,
        AnalyzerConfig::default(),
    )?;
    let filter = MatchFilter::new(documents(&["a fox", "a dog", "two fox"])?, Box::new(matcher))?;
    let mut limit = Limit::new(Box::new(filter), 1);

    // closed before ever being opened
    limit.close()?;

    limit.open()?;
    assert!(limit.next_tuple()?.is_some());
    limit.close()?;
    limit.close()?;

    // the tree can be opened again after being closed
    assert_eq!(run(&mut limit)?.len(), 1);
    Ok(())
}
