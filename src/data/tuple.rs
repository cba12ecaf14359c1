use crate::data::{Schema, Span, Value};
use crate::error::DataError;
use std::sync::Arc;

/// A row of field values bound to a schema.
///
/// Construction checks the field count and every field's type against the
/// schema; a tuple is never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Value>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>, fields: Vec<Value>) -> Result<Self, DataError> {
        if fields.len() != schema.len() {
            return Err(DataError::FieldCount {
                expected: schema.len(),
                actual: fields.len(),
            });
        }
        for (value, attribute) in fields.iter().zip(schema.attributes()) {
            if !value.is_compatible_with(attribute.attribute_type()) {
                return Err(DataError::FieldType {
                    attribute: attribute.name().to_string(),
                    expected: attribute.attribute_type(),
                    actual: value.type_name(),
                });
            }
        }
        Ok(Self { schema, fields })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Value, DataError> {
        self.schema
            .index_of(name)
            .map(|index| &self.fields[index])
            .ok_or_else(|| DataError::UnknownAttribute(name.to_string()))
    }

    /// Spans stored in a list attribute; empty when absent or NULL
    pub fn spans(&self, name: &str) -> &[Span] {
        self.schema
            .index_of(name)
            .and_then(|index| self.fields[index].as_spans())
            .unwrap_or(&[])
    }

    pub fn into_fields(self) -> Vec<Value> {
        self.fields
    }

    /// JSON object keyed by attribute name, in schema order
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.schema
            .names()
            .zip(&self.fields)
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, AttributeType};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                Attribute::new("id", AttributeType::Integer),
                Attribute::new("title", AttributeType::String),
                Attribute::span_list(),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_tuple_creation() -> anyhow::Result<()> {
        let span = Span::new("title", "rust", 0, 4, 0);
        let tuple = Tuple::new(
            schema(),
            vec![
                Value::Integer(1),
                Value::String("rust".to_string()),
                Value::List(vec![span.clone()]),
            ],
        )?;

        assert_eq!(tuple.get(0), Some(&Value::Integer(1)));
        assert_eq!(tuple.get_by_name("title")?, &Value::String("rust".to_string()));
        assert_eq!(tuple.spans("spanList"), &[span]);
        assert!(tuple.spans("payload").is_empty());
        assert!(tuple.get_by_name("missing").is_err());
        Ok(())
    }

    #[test]
    fn test_json_object() -> anyhow::Result<()> {
        let tuple = Tuple::new(
            schema(),
            vec![
                Value::Integer(1),
                Value::Null,
                Value::List(vec![Span::new("title", "rust", 0, 4, 0)]),
            ],
        )?;
        let object = tuple.to_json_object();
        let keys: Vec<_> = object.keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"spanList"));
        assert_eq!(object["id"], serde_json::json!(1));
        assert_eq!(object["title"], serde_json::Value::Null);
        assert_eq!(object["spanList"][0]["value"], serde_json::json!("rust"));
        Ok(())
    }

    #[test]
    fn test_field_count_mismatch() {
        let result = Tuple::new(schema(), vec![Value::Integer(1)]);
        assert!(matches!(
            result,
            Err(DataError::FieldCount {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_field_type_mismatch_is_not_coerced() {
        let result = Tuple::new(
            schema(),
            vec![
                Value::Long(1),
                Value::String("x".to_string()),
                Value::List(vec![]),
            ],
        );
        assert!(matches!(
            result,
            Err(DataError::FieldType { attribute, actual: "long", .. }) if attribute == "id"
        ));
    }

    #[test]
    fn test_tuple_equality() -> anyhow::Result<()> {
        let fields = vec![Value::Integer(1), Value::Null, Value::List(vec![])];
        let a = Tuple::new(schema(), fields.clone())?;
        let b = Tuple::new(schema(), fields.clone())?;
        assert_eq!(a, b);

        let other_schema = Arc::new(Schema::new(vec![
            Attribute::new("key", AttributeType::Integer),
            Attribute::new("title", AttributeType::String),
            Attribute::span_list(),
        ])?);
        let c = Tuple::new(other_schema, fields)?;
        assert_ne!(a, c);
        Ok(())
    }
}
