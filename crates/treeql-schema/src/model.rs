//! Model, attribute and relationship descriptors

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use treeql_core::Value;

/// Declared type of an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Uuid,
    Decimal,
    /// Enumeration: member name to underlying value
    Enum { members: BTreeMap<String, Value> },
    /// A type the core knows nothing about; literals pass through untouched
    /// unless a coercion is registered under this name
    Custom(String),
}

impl AttributeType {
    /// Key under which literal coercions for this type are registered
    pub fn key(&self) -> &str {
        match self {
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::String => "string",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::DateTime => "datetime",
            AttributeType::Time => "time",
            AttributeType::Uuid => "uuid",
            AttributeType::Decimal => "decimal",
            AttributeType::Enum { .. } => "enum",
            AttributeType::Custom(name) => name,
        }
    }

    /// Whether a (coerced) value can be compared against this type.
    /// Lists are accepted when every element is.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::List(items)) => items.iter().all(|item| self.accepts(item)),
            (AttributeType::Custom(_), _) => true,
            (AttributeType::Integer, Value::Integer(_)) => true,
            (AttributeType::Float, Value::Float(_) | Value::Integer(_)) => true,
            (AttributeType::String, Value::String(_)) => true,
            (AttributeType::Boolean, Value::Boolean(_)) => true,
            (AttributeType::Date, Value::Date(_)) => true,
            (AttributeType::DateTime, Value::DateTime(_)) => true,
            (AttributeType::Time, Value::Time(_)) => true,
            (AttributeType::Uuid, Value::Uuid(_)) => true,
            (AttributeType::Decimal, Value::Decimal(_) | Value::Integer(_)) => true,
            (AttributeType::Enum { .. }, Value::Enum { .. }) => true,
            _ => false,
        }
    }
}

/// Whether a relationship yields one or many related objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn is_many(self) -> bool {
        matches!(self, Cardinality::Many)
    }
}

/// Join condition of a relationship: `parent.local == child.remote`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeys {
    pub local: String,
    pub remote: String,
}

impl JoinKeys {
    pub fn new(local: &str, remote: &str) -> Self {
        Self {
            local: local.to_string(),
            remote: remote.to_string(),
        }
    }
}

/// A resolved attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Model declaring the attribute
    pub model: String,

    /// Attribute (column) name
    pub name: String,

    /// Declared type
    pub ty: AttributeType,
}

/// A resolved relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    /// Model declaring the relationship
    pub model: String,

    /// Relationship name
    pub name: String,

    /// Target model name
    pub target: String,

    /// One or many
    pub cardinality: Cardinality,

    /// How parent and target rows are matched
    pub join: JoinKeys,
}

impl RelationshipDescriptor {
    pub fn is_many(&self) -> bool {
        self.cardinality.is_many()
    }
}

/// A model (mapped class / table) definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model name, also the qualified type name of its objects
    pub name: String,

    /// Primary key columns
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Attributes by name
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDescriptor>,

    /// Relationships by name
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDescriptor>,

    /// Polymorphic parent, if this model is a variant
    #[serde(default)]
    pub parent: Option<String>,

    /// Direct polymorphic variants (filled in by the registry)
    #[serde(default)]
    pub variants: BTreeSet<String>,
}

impl ModelDescriptor {
    /// Create a model with no attributes
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            primary_key: Vec::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            parent: None,
            variants: BTreeSet::new(),
        }
    }

    /// Builder: add a primary key column (declares it as an integer
    /// attribute if not already declared)
    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key.push(column.to_string());
        if !self.attributes.contains_key(column) {
            self = self.attribute(column, AttributeType::Integer);
        }
        self
    }

    /// Builder: add an attribute
    pub fn attribute(mut self, name: &str, ty: AttributeType) -> Self {
        self.attributes.insert(
            name.to_string(),
            AttributeDescriptor {
                model: self.name.clone(),
                name: name.to_string(),
                ty,
            },
        );
        self
    }

    /// Builder: add a to-one relationship
    pub fn has_one(self, name: &str, target: &str, join: JoinKeys) -> Self {
        self.relationship(name, target, Cardinality::One, join)
    }

    /// Builder: add a to-many relationship
    pub fn has_many(self, name: &str, target: &str, join: JoinKeys) -> Self {
        self.relationship(name, target, Cardinality::Many, join)
    }

    fn relationship(mut self, name: &str, target: &str, cardinality: Cardinality, join: JoinKeys) -> Self {
        self.relationships.insert(
            name.to_string(),
            RelationshipDescriptor {
                model: self.name.clone(),
                name: name.to_string(),
                target: target.to_string(),
                cardinality,
                join,
            },
        );
        self
    }

    /// Builder: declare this model a polymorphic variant of `parent`
    pub fn variant_of(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Get an attribute by name
    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    /// Get a relationship by name
    pub fn relationship_named(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(name)
    }
}
