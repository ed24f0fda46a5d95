//! In-memory relational engine
//!
//! Tables are plain row vectors keyed by concrete model. A query is evaluated
//! as a list of alias bindings: the root scan produces one binding per row,
//! each join extends bindings with matching child rows (inner join), and each
//! filter keeps the bindings whose predicate is definitely true.

use crate::engine::RelationalEngine;
use crate::graph::{Object, ObjectKey, Related, ResultGraph};
use crate::plan::{Alias, Column, CompareOp, EagerChain, Join, Predicate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;
use treeql_core::{Error, Result, Value};
use treeql_schema::{Cardinality, SchemaRegistry};

/// A stored row: column name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a column
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, column: K, value: V) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column value
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, column: K, value: V) {
        self.columns.insert(column.into(), value.into());
    }

    /// Get a column value
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Column value, null when absent
    fn value(&self, column: &str) -> &Value {
        self.columns.get(column).unwrap_or(&Value::Null)
    }

    /// Iterate over column names
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    /// Iterate over columns
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Query under construction for [`MemoryEngine`]
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    root: Alias,
    joins: Vec<Join>,
    eager: Vec<EagerChain>,
    filters: Vec<Predicate>,
}

/// A row reached through some alias
#[derive(Debug, Clone, Copy)]
struct RowRef<'a> {
    model: &'a str,
    row: &'a Row,
}

/// Alias index to bound row
type Binding<'a> = BTreeMap<usize, RowRef<'a>>;

type Tables = HashMap<String, Vec<Row>>;

/// In-memory engine over a fixed schema
#[derive(Debug)]
pub struct MemoryEngine {
    schema: Arc<SchemaRegistry>,

    /// Concrete model name -> rows in insertion order
    tables: RwLock<Tables>,

    /// Hierarchy root model -> last assigned integer key
    sequences: RwLock<HashMap<String, i64>>,
}

impl MemoryEngine {
    /// Create an empty engine for `schema`
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            schema,
            tables: RwLock::new(HashMap::new()),
            sequences: RwLock::new(HashMap::new()),
        }
    }

    /// Schema the engine stores rows for
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    /// Insert a row into `model` and return its primary key.
    ///
    /// A missing single-column primary key is assigned from a sequence shared
    /// by the model's whole variant hierarchy.
    pub fn insert(&self, model: &str, mut row: Row) -> Result<Vec<Value>> {
        let descriptor = self.schema.get_model(model)?;
        if let Some(column) = row
            .columns()
            .find(|column| descriptor.attribute_named(column).is_none())
        {
            return Err(Error::Engine(format!(
                "model `{}` has no column `{}`",
                model, column
            )));
        }

        if let [pk] = descriptor.primary_key.as_slice() {
            let root = self.hierarchy_root(model);
            let mut sequences = self
                .sequences
                .write()
                .map_err(|_| Error::Engine("sequence lock poisoned".to_string()))?;
            let last = sequences.entry(root.to_string()).or_insert(0);
            match row.get(pk) {
                Some(Value::Integer(id)) => *last = (*last).max(*id),
                Some(value) if !value.is_null() => {}
                _ => {
                    *last += 1;
                    row.set(pk.clone(), *last);
                }
            }
        }

        let key = descriptor
            .primary_key
            .iter()
            .map(|column| row.value(column).clone())
            .collect();

        self.tables
            .write()
            .map_err(|_| Error::Engine("table lock poisoned".to_string()))?
            .entry(model.to_string())
            .or_default()
            .push(row);
        Ok(key)
    }

    /// Number of rows stored for `model` and its variants
    pub fn count(&self, model: &str) -> Result<usize> {
        let tables = self.read_tables()?;
        Ok(self.scan(&tables, model)?.len())
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Engine("table lock poisoned".to_string()))
    }

    fn hierarchy_root<'a>(&'a self, model: &'a str) -> &'a str {
        let mut current = model;
        while let Some(parent) = self
            .schema
            .get_model(current)
            .ok()
            .and_then(|m| m.parent.as_deref())
        {
            current = parent;
        }
        current
    }

    /// Rows of `model` and all of its variants, variants after the base
    fn scan<'a>(&'a self, tables: &'a Tables, model: &str) -> Result<Vec<RowRef<'a>>> {
        let mut out = Vec::new();
        for variant in self.schema.variants_of(model)? {
            if let Some(rows) = tables.get(variant) {
                out.extend(rows.iter().map(|row| RowRef { model: variant, row }));
            }
        }
        Ok(out)
    }

    /// Rows of `target` whose `remote` column equals `local`
    fn related<'a>(
        &'a self,
        tables: &'a Tables,
        target: &str,
        remote: &str,
        local: &Value,
    ) -> Result<Vec<RowRef<'a>>> {
        if local.is_null() {
            return Ok(Vec::new());
        }
        Ok(self
            .scan(tables, target)?
            .into_iter()
            .filter(|r| r.row.value(remote).compare(local) == Some(Ordering::Equal))
            .collect())
    }

    fn bound<'a, 'b>(binding: &'b Binding<'a>, alias: &Alias) -> Result<&'b RowRef<'a>> {
        binding
            .get(&alias.index)
            .ok_or_else(|| Error::Evaluation(format!("alias {} is not joined", alias)))
    }

    fn apply_join<'a>(
        &'a self,
        tables: &'a Tables,
        bindings: Vec<Binding<'a>>,
        join: &Join,
    ) -> Result<Vec<Binding<'a>>> {
        let mut out = Vec::new();
        for binding in bindings {
            let parent = Self::bound(&binding, &join.parent)?;
            let local = parent.row.value(&join.relationship.join.local);
            let children = self.related(tables, &join.alias.model, &join.relationship.join.remote, local)?;
            for child in children {
                let mut extended = binding.clone();
                extended.insert(join.alias.index, child);
                out.push(extended);
            }
        }
        Ok(out)
    }

    /// Three-valued evaluation; `None` is unknown
    fn eval<'a>(
        &'a self,
        tables: &'a Tables,
        predicate: &Predicate,
        binding: &Binding<'a>,
        related: Option<&Row>,
    ) -> Result<Option<bool>> {
        match predicate {
            Predicate::And(left, right) => {
                let l = self.eval(tables, left, binding, related)?;
                let r = self.eval(tables, right, binding, related)?;
                Ok(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                })
            }
            Predicate::Or(left, right) => {
                let l = self.eval(tables, left, binding, related)?;
                let r = self.eval(tables, right, binding, related)?;
                Ok(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                })
            }
            Predicate::Not(inner) => Ok(self.eval(tables, inner, binding, related)?.map(|b| !b)),
            Predicate::Compare { column, op, value } => {
                let lhs = match column {
                    Column::Aliased { alias, attribute } => {
                        Self::bound(binding, alias)?.row.value(attribute)
                    }
                    Column::Related { attribute } => related
                        .ok_or_else(|| {
                            Error::Evaluation(format!(
                                "related column `{}` outside of an EXISTS",
                                attribute
                            ))
                        })?
                        .value(attribute),
                };
                Ok(compare(lhs, *op, value))
            }
            Predicate::Exists {
                parent,
                relationship,
                predicate,
            } => {
                let parent_row = Self::bound(binding, parent)?;
                let local = parent_row.row.value(&relationship.join.local);
                for candidate in
                    self.related(tables, &relationship.target, &relationship.join.remote, local)?
                {
                    if self.eval(tables, predicate, binding, Some(candidate.row))? == Some(true) {
                        return Ok(Some(true));
                    }
                }
                Ok(Some(false))
            }
        }
    }
}

/// SQL comparison semantics: any null operand yields unknown
fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> Option<bool> {
    match op {
        CompareOp::In => {
            if lhs.is_null() {
                return None;
            }
            let items = rhs.as_list().unwrap_or(std::slice::from_ref(rhs));
            let mut unknown = false;
            for item in items {
                match lhs.compare(item) {
                    Some(Ordering::Equal) => return Some(true),
                    None => unknown = true,
                    Some(_) => {}
                }
            }
            if unknown { None } else { Some(false) }
        }
        CompareOp::NotIn => compare(lhs, CompareOp::In, rhs).map(|b| !b),
        _ => {
            let ordering = lhs.compare(rhs)?;
            Some(match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::In | CompareOp::NotIn => return None,
            })
        }
    }
}

/// Identity-map key of a materialized row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowIdentity {
    /// Model plus a fully assigned primary key
    Keyed(String, String),
    /// Row with no primary key or a null key part, identified by its storage slot
    Slot(*const Row),
}

/// Builds the result graph with one object per (model, primary key)
struct Materializer<'a> {
    schema: &'a SchemaRegistry,
    graph: ResultGraph,
    identity: HashMap<RowIdentity, ObjectKey>,
}

impl<'a> Materializer<'a> {
    fn new(schema: &'a SchemaRegistry) -> Self {
        Self {
            schema,
            graph: ResultGraph::new(),
            identity: HashMap::new(),
        }
    }

    fn object(&mut self, row: &RowRef<'_>) -> Result<ObjectKey> {
        let model = self.schema.get_model(row.model)?;
        let primary_key: Vec<Value> = model
            .primary_key
            .iter()
            .map(|column| row.row.value(column).clone())
            .collect();
        let identity = if primary_key.is_empty() || primary_key.iter().any(Value::is_null) {
            RowIdentity::Slot(row.row as *const Row)
        } else {
            RowIdentity::Keyed(
                row.model.to_string(),
                primary_key
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("."),
            )
        };
        if let Some(key) = self.identity.get(&identity) {
            return Ok(*key);
        }

        let mut object = Object::new(row.model, Some(primary_key));
        for name in model.attributes.keys() {
            object.fields.insert(name.clone(), row.row.value(name).clone());
        }
        for (name, rel) in &model.relationships {
            object
                .relations
                .insert(name.clone(), Related::Deferred(rel.cardinality));
        }
        let key = self.graph.insert(object);
        self.identity.insert(identity, key);
        Ok(key)
    }

    /// Attach `child` to `parent.relationship`, marking it loaded
    fn attach(&mut self, parent: ObjectKey, relationship: &str, child: ObjectKey) -> Result<()> {
        let type_name = self
            .graph
            .get(parent)
            .map(|o| o.type_name.clone())
            .ok_or_else(|| Error::Evaluation("dangling object key".to_string()))?;
        let cardinality = self.schema.get_relationship(&type_name, relationship)?.cardinality;
        let Some(object) = self.graph.get_mut(parent) else {
            return Ok(());
        };
        let slot = object
            .relations
            .entry(relationship.to_string())
            .or_insert(Related::Deferred(cardinality));
        if !slot.is_loaded() {
            *slot = Related::empty(cardinality);
        }
        match (slot, cardinality) {
            (Related::Many(children), Cardinality::Many) => {
                if !children.contains(&child) {
                    children.push(child);
                }
            }
            (slot, _) => *slot = Related::One(Some(child)),
        }
        Ok(())
    }
}

impl RelationalEngine for MemoryEngine {
    type Query = MemoryQuery;

    fn begin(&self, model: &str, alias: &Alias) -> Result<MemoryQuery> {
        self.schema.get_model(model)?;
        Ok(MemoryQuery {
            root: alias.clone(),
            joins: Vec::new(),
            eager: Vec::new(),
            filters: Vec::new(),
        })
    }

    fn join(&self, query: &mut MemoryQuery, join: &Join) -> Result<()> {
        self.schema.get_model(&join.alias.model)?;
        query.joins.push(join.clone());
        Ok(())
    }

    fn eager_load(&self, query: &mut MemoryQuery, chain: &EagerChain) -> Result<()> {
        query.eager.push(chain.clone());
        Ok(())
    }

    fn filter(&self, query: &mut MemoryQuery, predicate: &Predicate) -> Result<()> {
        query.filters.push(predicate.clone());
        Ok(())
    }

    fn execute(&self, query: MemoryQuery) -> Result<ResultGraph> {
        let tables = self.read_tables()?;
        let tables: &Tables = &tables;

        let mut bindings: Vec<Binding<'_>> = self
            .scan(tables, &query.root.model)?
            .into_iter()
            .map(|row| Binding::from([(query.root.index, row)]))
            .collect();

        for join in &query.joins {
            bindings = self.apply_join(tables, bindings, join)?;
        }

        for predicate in &query.filters {
            let mut kept = Vec::with_capacity(bindings.len());
            for binding in bindings {
                if self.eval(tables, predicate, &binding, None)? == Some(true) {
                    kept.push(binding);
                }
            }
            bindings = kept;
        }

        let mut materializer = Materializer::new(&self.schema);
        let mut seen_roots = HashSet::new();
        for binding in &bindings {
            let root = materializer.object(Self::bound(binding, &query.root)?)?;
            if seen_roots.insert(root) {
                materializer.graph.push_root(root);
            }
            for chain in &query.eager {
                let mut parent = root;
                for step in chain.steps() {
                    let child = materializer.object(Self::bound(binding, &step.alias)?)?;
                    materializer.attach(parent, &step.relationship, child)?;
                    parent = child;
                }
            }
        }

        debug!(
            "Executed query on {}: {} bindings, {} roots, {} objects",
            query.root,
            bindings.len(),
            materializer.graph.roots().len(),
            materializer.graph.len()
        );
        Ok(materializer.graph)
    }
}
