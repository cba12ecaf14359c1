use crate::data::AttributeType;
use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Generated identity attribute, prepended by source operators
pub const ID_ATTRIBUTE: &str = "_id";
/// Token spans of a row's text attributes, appended by scans
pub const PAYLOAD_ATTRIBUTE: &str = "payload";
/// Match spans accumulated by matchers
pub const SPAN_LIST_ATTRIBUTE: &str = "spanList";

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    attribute_name: String,
    attribute_type: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            attribute_name: name.into(),
            attribute_type,
        }
    }

    pub fn id() -> Self {
        Self::new(ID_ATTRIBUTE, AttributeType::Id)
    }

    pub fn payload() -> Self {
        Self::new(PAYLOAD_ATTRIBUTE, AttributeType::List)
    }

    pub fn span_list() -> Self {
        Self::new(SPAN_LIST_ATTRIBUTE, AttributeType::List)
    }

    pub fn name(&self) -> &str {
        &self.attribute_name
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    /// Whether this is one of the engine-managed attributes
    pub fn is_reserved(&self) -> bool {
        is_reserved_name(&self.attribute_name)
    }
}

pub(crate) fn is_reserved_name(name: &str) -> bool {
    matches!(name, ID_ATTRIBUTE | PAYLOAD_ATTRIBUTE | SPAN_LIST_ATTRIBUTE)
}

/// Ordered list of attributes with unique names.
///
/// Two schemas are equal iff they hold the same (name, type) pairs in the
/// same order. Every way of building a schema re-checks name uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Result<Self, PlanError> {
        let mut seen = HashSet::with_capacity(attributes.len());
        for attribute in &attributes {
            if !seen.insert(attribute.name()) {
                return Err(PlanError::DuplicateAttribute {
                    name: attribute.name().to_string(),
                });
            }
        }
        Ok(Self { attributes })
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name() == name)
    }

    /// Resolve an attribute name to its position
    pub fn position(&self, name: &str) -> Result<usize, PlanError> {
        self.index_of(name)
            .ok_or_else(|| PlanError::AttributeNotFound {
                name: name.to_string(),
            })
    }

    pub fn attribute(&self, name: &str) -> Result<&Attribute, PlanError> {
        Ok(&self.attributes[self.position(name)?])
    }

    /// Resolve `name` and require a type accepted by `accept`
    pub fn typed_position(
        &self,
        name: &str,
        expected: &str,
        accept: impl Fn(AttributeType) -> bool,
    ) -> Result<usize, PlanError> {
        let index = self.position(name)?;
        let actual = self.attributes[index].attribute_type();
        if !accept(actual) {
            return Err(PlanError::AttributeTypeMismatch {
                attribute: name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(index)
    }

    /// Schema with the `_id` attribute prepended.
    ///
    /// Applying this to a schema that already carries `_id` is an error, so
    /// a row can never end up with two identities.
    pub fn with_id(&self) -> Result<Self, PlanError> {
        if self.contains(ID_ATTRIBUTE) {
            return Err(PlanError::ReservedAttributePresent {
                name: ID_ATTRIBUTE.to_string(),
            });
        }
        let mut attributes = Vec::with_capacity(self.len() + 1);
        attributes.push(Attribute::id());
        attributes.extend(self.attributes.iter().cloned());
        Schema::new(attributes)
    }

    pub fn append(&self, attribute: Attribute) -> Result<Self, PlanError> {
        let mut attributes = self.attributes.clone();
        attributes.push(attribute);
        Schema::new(attributes)
    }

    /// Schema with the named attribute removed (unchanged if absent)
    pub fn without(&self, name: &str) -> Self {
        Self {
            attributes: self
                .attributes
                .iter()
                .filter(|a| a.name() != name)
                .cloned()
                .collect(),
        }
    }

    /// Schema made of the attributes at `indices`, in that order
    pub fn project(&self, indices: &[usize]) -> Result<Self, PlanError> {
        let attributes = indices
            .iter()
            .map(|&index| {
                self.attributes
                    .get(index)
                    .cloned()
                    .ok_or(PlanError::IndexOutOfBounds {
                        index,
                        len: self.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Schema::new(attributes)
    }
}

impl TryFrom<Vec<Attribute>> for Schema {
    type Error = PlanError;

    fn try_from(attributes: Vec<Attribute>) -> Result<Self, Self::Error> {
        Schema::new(attributes)
    }
}

impl From<Schema> for Vec<Attribute> {
    fn from(schema: Schema) -> Self {
        schema.attributes
    }
}
