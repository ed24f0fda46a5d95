//! Materialized result object graph
//!
//! Objects live in an arena and refer to each other by [`ObjectKey`], so a
//! graph may contain cycles (a row reached again through a back reference is
//! the same object).

use std::collections::BTreeMap;
use treeql_core::Value;
use treeql_schema::Cardinality;

/// Index of an object inside a [`ResultGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(usize);

impl ObjectKey {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Persistence state of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Loaded from the engine
    Persistent,
    /// Created in memory, not attached to any session
    Transient,
    /// Created in memory and scheduled for insertion
    Pending,
}

/// Value of a relationship field
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// Not loaded; reading it would require another round trip
    Deferred(Cardinality),
    /// Loaded to-one relationship
    One(Option<ObjectKey>),
    /// Loaded to-many relationship
    Many(Vec<ObjectKey>),
}

impl Related {
    /// An empty loaded value of the given cardinality
    pub fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => Related::One(None),
            Cardinality::Many => Related::Many(Vec::new()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self, Related::Deferred(_))
    }
}

/// A field looked up by name on an [`Object`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Scalar(&'a Value),
    Related(&'a Related),
}

/// A materialized object
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Qualified type name (the concrete model)
    pub type_name: String,

    /// Primary key values, `None` until assigned
    pub primary_key: Option<Vec<Value>>,

    /// Persistence state
    pub state: ObjectState,

    /// Scalar fields
    pub fields: BTreeMap<String, Value>,

    /// Relationship fields
    pub relations: BTreeMap<String, Related>,
}

impl Object {
    /// Create an empty persistent object
    pub fn new(type_name: &str, primary_key: Option<Vec<Value>>) -> Self {
        Self {
            type_name: type_name.to_string(),
            primary_key,
            state: ObjectState::Persistent,
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Create an unsaved object with no primary key
    pub fn transient(type_name: &str) -> Self {
        Self {
            state: ObjectState::Transient,
            ..Self::new(type_name, None)
        }
    }

    /// Builder: set a scalar field
    pub fn with_field<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Builder: set a relationship field
    pub fn with_related(mut self, name: &str, related: Related) -> Self {
        self.relations.insert(name.to_string(), related);
        self
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<Field<'_>> {
        self.fields
            .get(name)
            .map(Field::Scalar)
            .or_else(|| self.relations.get(name).map(Field::Related))
    }

    /// Whether the named relationship was eagerly loaded
    pub fn is_loaded(&self, relationship: &str) -> bool {
        self.relations
            .get(relationship)
            .is_some_and(Related::is_loaded)
    }

    /// Whether the object has never been persisted
    pub fn is_unsaved(&self) -> bool {
        matches!(self.state, ObjectState::Transient | ObjectState::Pending)
    }
}

/// Arena of materialized objects plus the ordered root objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultGraph {
    objects: Vec<Object>,
    roots: Vec<ObjectKey>,
}

impl ResultGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object and return its key
    pub fn insert(&mut self, object: Object) -> ObjectKey {
        self.objects.push(object);
        ObjectKey(self.objects.len() - 1)
    }

    pub fn get(&self, key: ObjectKey) -> Option<&Object> {
        self.objects.get(key.0)
    }

    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut Object> {
        self.objects.get_mut(key.0)
    }

    /// Append a root object
    pub fn push_root(&mut self, key: ObjectKey) {
        self.roots.push(key);
    }

    /// Root objects in result order
    pub fn roots(&self) -> &[ObjectKey] {
        &self.roots
    }

    /// Iterate over root objects in result order
    pub fn root_objects(&self) -> impl Iterator<Item = &Object> {
        self.roots.iter().filter_map(|key| self.get(*key))
    }

    /// Total number of materialized objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
