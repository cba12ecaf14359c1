use crate::data::Span;
use crate::error::{DataError, PlanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Attribute types supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum AttributeType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Timestamp,
    Binary,
    /// Free text that is tokenized by the analyzer and indexed
    Text,
    /// List of spans (match metadata and payload)
    List,
    /// Generated tuple identity
    Id,
    /// Not yet resolved
    Any,
}

impl AttributeType {
    /// Name used in serialized plans and schemas
    pub fn wire_name(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Long => "long",
            AttributeType::Double => "double",
            AttributeType::Boolean => "boolean",
            AttributeType::Timestamp => "timestamp",
            AttributeType::Binary => "binary",
            AttributeType::Text => "text",
            AttributeType::List => "list",
            AttributeType::Id => "_id",
            AttributeType::Any => "any",
        }
    }

    /// Parse a wire name. Internal types are never accepted.
    pub fn from_wire(name: &str) -> Result<Self, PlanError> {
        match name {
            "string" => Ok(AttributeType::String),
            "integer" => Ok(AttributeType::Integer),
            "long" => Ok(AttributeType::Long),
            "double" => Ok(AttributeType::Double),
            "boolean" => Ok(AttributeType::Boolean),
            "timestamp" => Ok(AttributeType::Timestamp),
            "binary" => Ok(AttributeType::Binary),
            "text" => Ok(AttributeType::Text),
            _ => Err(PlanError::UnknownToken {
                vocabulary: "attribute type",
                value: name.to_string(),
            }),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AttributeType::List | AttributeType::Id | AttributeType::Any
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AttributeType::Integer | AttributeType::Long | AttributeType::Double
        )
    }

    /// Whether matchers can read this attribute as text
    pub fn is_textual(&self) -> bool {
        matches!(self, AttributeType::String | AttributeType::Text)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl TryFrom<String> for AttributeType {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AttributeType::from_wire(&value)
    }
}

impl From<AttributeType> for &'static str {
    fn from(value: AttributeType) -> Self {
        value.wire_name()
    }
}

/// Field values. Each variant is the native representation of exactly one
/// attribute type; `Null` stands in for a missing value of any type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
    Text(String),
    List(Vec<Span>),
    Id(Uuid),
}

impl Value {
    /// Get the attribute type of this value
    pub fn data_type(&self) -> Option<AttributeType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(AttributeType::String),
            Value::Integer(_) => Some(AttributeType::Integer),
            Value::Long(_) => Some(AttributeType::Long),
            Value::Double(_) => Some(AttributeType::Double),
            Value::Boolean(_) => Some(AttributeType::Boolean),
            Value::Timestamp(_) => Some(AttributeType::Timestamp),
            Value::Binary(_) => Some(AttributeType::Binary),
            Value::Text(_) => Some(AttributeType::Text),
            Value::List(_) => Some(AttributeType::List),
            Value::Id(_) => Some(AttributeType::Id),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.data_type().map_or("null", |t| t.wire_name())
    }

    /// Check if this value is compatible with the given attribute type
    pub fn is_compatible_with(&self, attribute_type: AttributeType) -> bool {
        match (self, attribute_type) {
            (Value::Null, _) => true,
            (_, AttributeType::Any) => true,
            (value, expected) => value.data_type() == Some(expected),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text content of string-like values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_spans(&self) -> Option<&[Span]> {
        match self {
            Value::List(spans) => Some(spans),
            _ => None,
        }
    }

    /// Numeric view used by aggregation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Compare two non-NULL values of the same type.
    ///
    /// Values of different types are never coerced into each other.
    pub fn compare(&self, other: &Value) -> Result<Ordering, DataError> {
        let ordering = match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => Some(a.total_cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            _ => None,
        };
        ordering.ok_or(DataError::Incomparable {
            left: self.type_name(),
            right: other.type_name(),
        })
    }

    /// Total order used for sorting: NULL sorts before everything, values of
    /// different types order by their type.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (a, b) => a
                .compare(b)
                .unwrap_or_else(|_| a.type_rank().cmp(&b.type_rank())),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Long(_) => 3,
            Value::Double(_) => 4,
            Value::Timestamp(_) => 5,
            Value::String(_) => 6,
            Value::Text(_) => 7,
            Value::Binary(_) => 8,
            Value::List(_) => 9,
            Value::Id(_) => 10,
        }
    }

    /// Decode a JSON value as the given attribute type
    pub fn from_json(
        json: &serde_json::Value,
        attribute: &str,
        attribute_type: AttributeType,
    ) -> Result<Value, DataError> {
        let malformed = |reason: &str| DataError::MalformedValue {
            attribute: attribute.to_string(),
            reason: format!("{} (got {})", reason, json),
        };

        if json.is_null() {
            return Ok(Value::Null);
        }

        let value = match attribute_type {
            AttributeType::String => Value::String(
                json.as_str()
                    .ok_or_else(|| malformed("expected a string"))?
                    .to_string(),
            ),
            AttributeType::Text => Value::Text(
                json.as_str()
                    .ok_or_else(|| malformed("expected a string"))?
                    .to_string(),
            ),
            AttributeType::Integer => {
                let n = json
                    .as_i64()
                    .ok_or_else(|| malformed("expected an integer"))?;
                Value::Integer(i32::try_from(n).map_err(|_| malformed("integer out of range"))?)
            }
            AttributeType::Long => {
                Value::Long(json.as_i64().ok_or_else(|| malformed("expected a long"))?)
            }
            AttributeType::Double => {
                Value::Double(json.as_f64().ok_or_else(|| malformed("expected a number"))?)
            }
            AttributeType::Boolean => {
                Value::Boolean(json.as_bool().ok_or_else(|| malformed("expected a boolean"))?)
            }
            AttributeType::Timestamp => {
                let parsed = match json {
                    serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                        .map(|t| t.with_timezone(&Utc))
                        .ok(),
                    serde_json::Value::Number(n) => {
                        n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis)
                    }
                    _ => None,
                };
                Value::Timestamp(
                    parsed.ok_or_else(|| malformed("expected RFC 3339 or epoch millis"))?,
                )
            }
            AttributeType::Binary => {
                let bytes = json
                    .as_array()
                    .ok_or_else(|| malformed("expected an array of bytes"))?
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(|| malformed("expected an array of bytes"))?;
                Value::Binary(bytes)
            }
            AttributeType::List => Value::List(
                serde_json::from_value(json.clone()).map_err(|e| malformed(&e.to_string()))?,
            ),
            AttributeType::Id => Value::Id(
                json.as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| malformed("expected a uuid"))?,
            ),
            AttributeType::Any => return Err(malformed("cannot decode an unresolved type")),
        };
        Ok(value)
    }

    /// Encode this value as JSON for sinks
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) | Value::Text(s) => json!(s),
            Value::Integer(i) => json!(i),
            Value::Long(l) => json!(l),
            Value::Double(d) => json!(d),
            Value::Boolean(b) => json!(b),
            Value::Timestamp(t) => json!(t.to_rfc3339()),
            Value::Binary(bytes) => json!(bytes),
            Value::List(spans) => serde_json::Value::Array(
                spans
                    .iter()
                    .map(|s| {
                        json!({
                            "key": s.key(),
                            "value": s.value(),
                            "start": s.start(),
                            "end": s.end(),
                            "tokenOffset": s.token_offset(),
                        })
                    })
                    .collect(),
            ),
            Value::Id(id) => json!(id.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::String(s) | Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Double(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::List(spans) => write!(f, "<{} spans>", spans.len()),
            Value::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Hashable wrapper for a list of values, used for grouping and join keys
#[derive(Clone, Debug)]
pub struct ValueKey(pub Vec<Value>);

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            value.type_rank().hash(state);
            match value {
                Value::Null => {}
                Value::String(s) | Value::Text(s) => s.hash(state),
                Value::Integer(i) => i.hash(state),
                Value::Long(l) => l.hash(state),
                Value::Double(d) => canonical_bits(*d).hash(state),
                Value::Boolean(b) => b.hash(state),
                Value::Timestamp(t) => t.hash(state),
                Value::Binary(bytes) => bytes.hash(state),
                Value::List(spans) => spans.hash(state),
                Value::Id(id) => id.hash(state),
            }
        }
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|pair| match pair {
                (Value::Double(a), Value::Double(b)) => canonical_bits(*a) == canonical_bits(*b),
                (a, b) => a == b,
            })
    }
}

/// Bit pattern under which `0.0`/`-0.0` and all NaNs each collapse to one key
fn canonical_bits(d: f64) -> u64 {
    if d.is_nan() {
        f64::NAN.to_bits()
    } else if d == 0.0 {
        0.0f64.to_bits()
    } else {
        d.to_bits()
    }
}

impl Eq for ValueKey {}
