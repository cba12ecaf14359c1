//! Instantiates validated plan descriptions.

use crate::analyzer::AnalyzerConfig;
use crate::data::{Schema, Value};
use crate::error::PlanError;
use crate::matcher::{
    ComparablePredicate, DictionaryMatcher, FuzzyTokenMatcher, KeywordMatcher, Matcher,
    NlpMatcher, RegexMatcher,
};
use crate::operator::{
    Aggregator, BoxedOperator, BoxedSink, EqualityJoinPredicate, Join, JoinPredicate,
    JsonLinesSink, KeywordSource, Limit, MatchFilter, ProjectedField, Projection, ScanSource,
    SimilarityJoinPredicate, Sort, TupleSink, TupleSource,
};
use crate::plan::logical::{LogicalPlan, OperatorDescription, OperatorKind, PlanGraph, ProjectionItem};
use crate::plan::{ExecutionContext, Plan};
use std::collections::HashMap;

/// Builds operator trees from plan descriptions.
///
/// The description is validated as a whole first; operators are then
/// constructed from the sources up, so every operator sees the output schema
/// of its inputs. Errors name the operator they come from.
pub struct PlanBuilder<'a> {
    context: &'a ExecutionContext,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(context: &'a ExecutionContext) -> Self {
        Self { context }
    }

    pub fn build(&self, plan: &LogicalPlan) -> Result<Plan, PlanError> {
        let graph = plan.validate()?;
        let descriptions: HashMap<&str, &OperatorDescription> = plan
            .operators
            .iter()
            .map(|o| (o.operator_id.as_str(), o))
            .collect();

        let build = Build {
            context: self.context,
            graph: &graph,
            descriptions,
        };
        let sink = build.sink(graph.sink())?;
        log::debug!("built plan with {} operators", plan.operators.len());
        Ok(Plan::new(sink))
    }
}

/// State of one `build` call
struct Build<'a> {
    context: &'a ExecutionContext,
    graph: &'a PlanGraph,
    descriptions: HashMap<&'a str, &'a OperatorDescription>,
}

impl Build<'_> {
    fn description(&self, id: &str) -> Result<&OperatorDescription, PlanError> {
        self.descriptions
            .get(id)
            .copied()
            .ok_or_else(|| PlanError::Malformed(format!("unknown operator '{}'", id)))
    }

    fn inputs(&self, id: &str) -> Result<Vec<BoxedOperator>, PlanError> {
        self.graph
            .inputs(id)
            .iter()
            .map(|input| self.operator(input))
            .collect()
    }

    fn sink(&self, id: &str) -> Result<BoxedSink, PlanError> {
        let description = self.description(id)?;
        let mut inputs = self.inputs(id)?;
        let input = single(&mut inputs).map_err(|e| e.in_operator(id))?;

        let sink: BoxedSink = match &description.kind {
            OperatorKind::ViewResults {
                limit,
                offset,
                chart_type,
            } => {
                let mut sink = TupleSink::new(input).with_limit(*limit, *offset).with_id(id);
                if let Some(chart) = chart_type {
                    sink = sink.with_chart(chart.clone());
                }
                Box::new(sink)
            }
            OperatorKind::JsonLines { path } => match path {
                Some(path) => Box::new(JsonLinesSink::to_file(input, path).with_id(id)),
                None => Box::new(JsonLinesSink::stdout(input).with_id(id)),
            },
            other => {
                return Err(PlanError::Malformed(format!(
                    "{} cannot be the root of a plan",
                    other.type_name()
                ))
                .in_operator(id))
            }
        };
        log::debug!("built sink '{}'", id);
        Ok(sink)
    }

    fn operator(&self, id: &str) -> Result<BoxedOperator, PlanError> {
        let description = self.description(id)?;
        let inputs = self.inputs(id)?;
        let operator = self
            .instantiate(id, &description.kind, inputs)
            .map_err(|e| e.in_operator(id))?;
        log::debug!("built {} '{}'", description.kind.type_name(), id);
        Ok(operator)
    }

    fn instantiate(
        &self,
        id: &str,
        kind: &OperatorKind,
        mut inputs: Vec<BoxedOperator>,
    ) -> Result<BoxedOperator, PlanError> {
        let operator: BoxedOperator = match kind {
            OperatorKind::ScanSource {
                index_name,
                payload,
                limit,
                offset,
            } => {
                let mut scan = ScanSource::new(self.context.catalog.get(index_name)?)?;
                if *payload {
                    scan = scan.with_payload()?;
                }
                Box::new(scan.with_limit(*limit, *offset).with_id(id))
            }
            OperatorKind::KeywordSource {
                index_name,
                query,
                attributes,
                matching_type,
                stop_words,
            } => Box::new(
                KeywordSource::new(
                    self.context.catalog.get(index_name)?,
                    query,
                    attributes.clone(),
                    *matching_type,
                    analyzer(*stop_words),
                )?
                .with_id(id),
            ),
            OperatorKind::Values { attributes, rows } => {
                let schema = Schema::new(attributes.clone())?;
                let rows = rows
                    .iter()
                    .enumerate()
                    .map(|(number, row)| decode_row(&schema, number, row))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(TupleSource::new(schema, rows)?.with_id(id))
            }
            OperatorKind::KeywordMatcher {
                query,
                attributes,
                matching_type,
                stop_words,
            } => {
                let matcher = KeywordMatcher::new(
                    query,
                    attributes.clone(),
                    *matching_type,
                    analyzer(*stop_words),
                )?;
                filter(id, single(&mut inputs)?, Box::new(matcher))?
            }
            OperatorKind::FuzzyTokenMatcher {
                query,
                attributes,
                threshold_ratio,
                stop_words,
            } => {
                let matcher = FuzzyTokenMatcher::new(
                    query,
                    attributes.clone(),
                    *threshold_ratio,
                    analyzer(*stop_words),
                )?;
                filter(id, single(&mut inputs)?, Box::new(matcher))?
            }
            OperatorKind::RegexMatcher {
                regex,
                attributes,
                case_insensitive,
            } => {
                let matcher = RegexMatcher::new(regex, attributes.clone(), *case_insensitive)?;
                filter(id, single(&mut inputs)?, Box::new(matcher))?
            }
            OperatorKind::DictionaryMatcher {
                dictionary,
                attributes,
                matching_type,
                stop_words,
            } => {
                let matcher = DictionaryMatcher::new(
                    dictionary.clone(),
                    attributes.clone(),
                    *matching_type,
                    analyzer(*stop_words),
                )?;
                filter(id, single(&mut inputs)?, Box::new(matcher))?
            }
            OperatorKind::NlpEntity {
                nlp_entity_type,
                attributes,
            } => {
                let matcher = NlpMatcher::new(
                    *nlp_entity_type,
                    attributes.clone(),
                    self.context.tagger.clone(),
                )?;
                filter(id, single(&mut inputs)?, Box::new(matcher))?
            }
            OperatorKind::Comparable {
                attribute,
                comparison_type,
                compare_to,
            } => {
                let input = single(&mut inputs)?;
                // The threshold takes the type of the attribute it is compared with
                let attribute_type = input.output_schema().attribute(attribute)?.attribute_type();
                let threshold = Value::from_json(compare_to, attribute, attribute_type)
                    .map_err(|e| PlanError::invalid("compareTo", e))?;
                let predicate = ComparablePredicate::new(attribute.clone(), *comparison_type, threshold)?;
                filter(id, input, Box::new(predicate))?
            }
            OperatorKind::Projection { attributes } => {
                let input = single(&mut inputs)?;
                let fields = attributes
                    .iter()
                    .map(|item| match item {
                        ProjectionItem::Name(name) => {
                            input.output_schema().position(name).map(ProjectedField::new)
                        }
                        ProjectionItem::Field(field) => Ok(field.clone()),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(Projection::new(input, fields)?.with_id(id))
            }
            OperatorKind::Limit { limit, offset } => {
                Box::new(Limit::with_offset(single(&mut inputs)?, *limit, *offset).with_id(id))
            }
            OperatorKind::Sort { sort_list } => {
                Box::new(Sort::new(single(&mut inputs)?, sort_list.clone())?.with_id(id))
            }
            OperatorKind::Aggregation {
                group_by,
                aggregations,
            } => Box::new(
                Aggregator::new(single(&mut inputs)?, group_by.clone(), aggregations.clone())?
                    .with_id(id),
            ),
            OperatorKind::Join {
                join_type,
                inner_attribute,
                outer_attribute,
                similarity_threshold,
            } => {
                let predicate: Box<dyn JoinPredicate> = match similarity_threshold {
                    Some(threshold) => Box::new(SimilarityJoinPredicate::new(
                        inner_attribute.clone(),
                        outer_attribute.clone(),
                        *threshold,
                    )?),
                    None => Box::new(EqualityJoinPredicate::new(
                        inner_attribute.clone(),
                        outer_attribute.clone(),
                    )),
                };
                let inner = single(&mut inputs)?;
                let outer = single(&mut inputs)?;
                Box::new(Join::new(inner, outer, *join_type, predicate)?.with_id(id))
            }
            OperatorKind::ViewResults { .. } | OperatorKind::JsonLines { .. } => {
                return Err(PlanError::Malformed(format!(
                    "{} can only be the root of a plan",
                    kind.type_name()
                )))
            }
        };
        Ok(operator)
    }
}

fn analyzer(stop_words: bool) -> AnalyzerConfig {
    AnalyzerConfig { stop_words }
}

/// Take the next input, in link order
fn single(inputs: &mut Vec<BoxedOperator>) -> Result<BoxedOperator, PlanError> {
    if inputs.is_empty() {
        return Err(PlanError::InputArity {
            expected: 1,
            actual: 0,
        });
    }
    Ok(inputs.remove(0))
}

fn filter(
    id: &str,
    input: BoxedOperator,
    matcher: Box<dyn Matcher>,
) -> Result<BoxedOperator, PlanError> {
    Ok(Box::new(MatchFilter::new(input, matcher)?.with_id(id)))
}

fn decode_row(schema: &Schema, number: usize, row: &[serde_json::Value]) -> Result<Vec<Value>, PlanError> {
    if row.len() != schema.len() {
        return Err(PlanError::invalid(
            "rows",
            format!("row {} has {} values, expected {}", number, row.len(), schema.len()),
        ));
    }
    row.iter()
        .zip(schema.attributes())
        .map(|(json, attribute)| Value::from_json(json, attribute.name(), attribute.attribute_type()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PlanError::invalid("rows", format!("row {}: {}", number, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, AttributeType};
    use crate::index::{IndexCatalog, MemoryIndex};
    use crate::plan::evaluate;
    use std::sync::Arc;

    fn context() -> ExecutionContext {
        let schema = Schema::new(vec![
            Attribute::new("title", AttributeType::String),
            Attribute::new("content", AttributeType::Text),
            Attribute::new("year", AttributeType::Integer),
        ])
        .unwrap();
        let rows = vec![
            vec![
                Value::String("Booking".to_string()),
                Value::Text("an appointment for a book".to_string()),
                Value::Integer(2019),
            ],
            vec![
                Value::String("Shops".to_string()),
                Value::Text("bookstore appointment".to_string()),
                Value::Integer(2021),
            ],
        ];
        let catalog = IndexCatalog::new();
        catalog.register(Arc::new(MemoryIndex::new("news", schema, rows).unwrap()));
        ExecutionContext::new(Arc::new(catalog))
    }

    fn build(json: serde_json::Value) -> Result<Plan, PlanError> {
        let plan: LogicalPlan = serde_json::from_value(json).unwrap();
        PlanBuilder::new(&context()).build(&plan)
    }

    #[test]
    fn test_build_and_evaluate() -> anyhow::Result<()> {
        let mut plan = build(serde_json::json!({
            "operators": [
                {"operatorId": "scan", "operatorType": "ScanSource", "indexName": "news"},
                {"operatorId": "recent", "operatorType": "Comparable",
                 "attribute": "year", "comparisonType": ">", "compareTo": 2020},
                {"operatorId": "pick", "operatorType": "Projection", "attributes": ["title"]},
                {"operatorId": "out", "operatorType": "ViewResults"}
            ],
            "links": [
                {"origin": "scan", "destination": "recent"},
                {"origin": "recent", "destination": "pick"},
                {"origin": "pick", "destination": "out"}
            ]
        }))?;
        assert_eq!(plan.sink_id(), "out");

        assert_eq!(evaluate(&mut plan)?.tuples, 1);
        let results = plan.take_results();
        assert_eq!(results[0].fields(), &[Value::String("Shops".to_string())]);
        Ok(())
    }

    #[test]
    fn test_errors_name_the_operator() {
        let err = build(serde_json::json!({
            "operators": [
                {"operatorId": "scan", "operatorType": "ScanSource", "indexName": "news"},
                {"operatorId": "bad", "operatorType": "RegexMatcher",
                 "regex": "(unclosed", "attributes": ["content"]},
                {"operatorId": "out", "operatorType": "ViewResults"}
            ],
            "links": [
                {"origin": "scan", "destination": "bad"},
                {"origin": "bad", "destination": "out"}
            ]
        }))
        .err()
        .unwrap();
        assert_eq!(err.operator(), Some("bad"));
        assert!(matches!(err.root(), PlanError::InvalidRegex { .. }));

        let err = build(serde_json::json!({
            "operators": [
                {"operatorId": "scan", "operatorType": "ScanSource", "indexName": "sports"},
                {"operatorId": "out", "operatorType": "ViewResults"}
            ],
            "links": [{"origin": "scan", "destination": "out"}]
        }))
        .err()
        .unwrap();
        assert_eq!(err.operator(), Some("scan"));
        assert!(matches!(err.root(), PlanError::UnknownIndex(_)));
    }

    #[test]
    fn test_comparable_threshold_takes_attribute_type() {
        let err = build(serde_json::json!({
            "operators": [
                {"operatorId": "scan", "operatorType": "ScanSource", "indexName": "news"},
                {"operatorId": "cmp", "operatorType": "Comparable",
                 "attribute": "year", "comparisonType": "=", "compareTo": "2020"},
                {"operatorId": "out", "operatorType": "ViewResults"}
            ],
            "links": [
                {"origin": "scan", "destination": "cmp"},
                {"origin": "cmp", "destination": "out"}
            ]
        }))
        .err()
        .unwrap();
        assert!(matches!(
            err.root(),
            PlanError::InvalidProperty { property, .. } if property == "compareTo"
        ));
    }

    #[test]
    fn test_values_rows_are_checked() {
        let err = build(serde_json::json!({
            "operators": [
                {"operatorId": "v", "operatorType": "Values",
                 "attributes": [{"attributeName": "n", "attributeType": "integer"}],
                 "rows": [[1], ["two"]]},
                {"operatorId": "out", "operatorType": "ViewResults"}
            ],
            "links": [{"origin": "v", "destination": "out"}]
        }))
        .err()
        .unwrap();
        assert_eq!(err.operator(), Some("v"));
        assert!(err.to_string().contains("row 1"));
    }
}
