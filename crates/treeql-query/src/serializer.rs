//! Result graph to JSON documents
//!
//! Objects are emitted as maps with sorted keys: every scalar field, plus
//! every relationship that was eagerly loaded. A relationship pointing at an
//! object already on the path from the current root is left out, which turns
//! any cyclic graph into a finite tree. Siblings reached through different
//! paths are serialized independently.

use serde_json::{Map, Number, Value as Json};
use std::collections::HashSet;
use treeql_core::{Error, Result, Value};
use treeql_engine::{Object, ObjectKey, Related, ResultGraph};
use treeql_schema::Cardinality;

/// Identity of an object for cycle detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Type name plus primary key values joined with `.`
    Persistent { type_name: String, key: String },
    /// Object without a fully assigned primary key, identified by its arena slot
    Unassigned { type_name: String, slot: ObjectKey },
}

impl IdentityKey {
    pub fn of(object: &Object, slot: ObjectKey) -> Self {
        match &object.primary_key {
            Some(values) if !values.is_empty() && !values.iter().any(Value::is_null) => IdentityKey::Persistent {
                type_name: object.type_name.clone(),
                key: values
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("."),
            },
            _ => IdentityKey::Unassigned {
                type_name: object.type_name.clone(),
                slot,
            },
        }
    }
}

/// Serialize the root objects of `graph` into a JSON array
pub fn serialize(graph: &ResultGraph) -> Result<Json> {
    let serializer = Serializer { graph };
    let mut path = HashSet::new();
    graph
        .roots()
        .iter()
        .map(|key| serializer.object(*key, &mut path))
        .collect::<Result<Vec<_>>>()
        .map(Json::Array)
}

/// Canonical JSON form of a scalar
pub fn scalar(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => Json::String(dt.to_rfc3339()),
        Value::Time(t) => Json::String(t.to_string()),
        Value::Uuid(u) => Json::String(u.to_string()),
        Value::Decimal(d) => Number::from_f64(d.to_f64()).map_or(Json::Null, Json::Number),
        Value::Enum { value, .. } => scalar(value),
        Value::List(items) => Json::Array(items.iter().map(scalar).collect()),
    }
}

struct Serializer<'g> {
    graph: &'g ResultGraph,
}

impl Serializer<'_> {
    fn get(&self, key: ObjectKey) -> Result<&Object> {
        self.graph
            .get(key)
            .ok_or_else(|| Error::Serialization(format!("dangling object key {}", key.index())))
    }

    fn identity(&self, key: ObjectKey) -> Result<IdentityKey> {
        Ok(IdentityKey::of(self.get(key)?, key))
    }

    fn object(&self, key: ObjectKey, path: &mut HashSet<IdentityKey>) -> Result<Json> {
        let object = self.get(key)?;
        let identity = IdentityKey::of(object, key);
        path.insert(identity.clone());

        let mut out = Map::new();
        for (name, value) in &object.fields {
            out.insert(name.clone(), scalar(value));
        }
        for (name, related) in &object.relations {
            if let Some(json) = self.related(object, related, path)? {
                out.insert(name.clone(), json);
            }
        }

        path.remove(&identity);
        Ok(Json::Object(out))
    }

    /// `None` when the field is left out of the document
    fn related(&self, owner: &Object, related: &Related, path: &mut HashSet<IdentityKey>) -> Result<Option<Json>> {
        match related {
            Related::Deferred(cardinality) => Ok(owner.is_unsaved().then(|| match cardinality {
                Cardinality::One => Json::Null,
                Cardinality::Many => Json::Array(Vec::new()),
            })),
            Related::One(None) => Ok(Some(Json::Null)),
            Related::One(Some(target)) => {
                if path.contains(&self.identity(*target)?) {
                    return Ok(None);
                }
                self.object(*target, path).map(Some)
            }
            Related::Many(targets) => {
                let mut items = Vec::with_capacity(targets.len());
                for target in targets {
                    if path.contains(&self.identity(*target)?) {
                        continue;
                    }
                    items.push(self.object(*target, path)?);
                }
                Ok(Some(Json::Array(items)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use serde_json::json;
    use treeql_core::Decimal;
    use treeql_engine::ObjectState;
    use uuid::Uuid;

    fn tube(id: i64) -> Object {
        Object::new("Tube", Some(vec![Value::Integer(id)]))
            .with_field("id", id)
            .with_related("sample", Related::Deferred(Cardinality::One))
    }

    #[test]
    fn test_scalars_are_canonical() {
        let uuid = Uuid::nil();
        assert_eq!(
            scalar(&Value::Date(NaiveDate::from_ymd_opt(2017, 1, 2).unwrap())),
            json!("2017-01-02")
        );
        assert_eq!(
            scalar(&Value::DateTime(Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap())),
            json!("2020-05-06T07:08:09+00:00")
        );
        assert_eq!(
            scalar(&Value::Time(NaiveTime::from_hms_opt(7, 8, 9).unwrap())),
            json!("07:08:09")
        );
        assert_eq!(scalar(&Value::Uuid(uuid)), json!(uuid.to_string()));
        assert_eq!(scalar(&Value::Decimal(Decimal::new(150, 2))), json!(1.5));
        assert_eq!(
            scalar(&Value::Enum {
                name: "FROZEN".into(),
                value: Box::new(Value::Integer(1)),
            }),
            json!(1)
        );
        assert_eq!(scalar(&Value::Float(f64::NAN)), Json::Null);
    }

    #[test]
    fn test_deferred_relationships_are_skipped() {
        let mut graph = ResultGraph::new();
        let key = graph.insert(tube(1).with_field("name", "t1"));
        graph.push_root(key);

        let doc = serialize(&graph).unwrap();
        assert_eq!(doc, json!([{"id": 1, "name": "t1"}]));
    }

    #[test]
    fn test_unsaved_objects_emit_empty_relationships() {
        let mut graph = ResultGraph::new();
        let key = graph.insert(
            Object::transient("Sample")
                .with_field("name", "new")
                .with_related("tube", Related::Deferred(Cardinality::One))
                .with_related("tubes", Related::Deferred(Cardinality::Many)),
        );
        graph.push_root(key);

        let doc = serialize(&graph).unwrap();
        assert_eq!(doc, json!([{"name": "new", "tube": null, "tubes": []}]));
    }

    #[test]
    fn test_self_reference_breaks_cycle() {
        let mut graph = ResultGraph::new();
        let a = graph.insert(tube(1));
        let b = graph.insert(tube(2));
        graph
            .get_mut(a)
            .unwrap()
            .relations
            .insert("self_tube".into(), Related::One(Some(b)));
        graph
            .get_mut(b)
            .unwrap()
            .relations
            .insert("self_tube".into(), Related::One(Some(a)));
        graph.push_root(a);
        graph.push_root(b);

        let doc = serialize(&graph).unwrap();
        assert_eq!(
            doc,
            json!([
                {"id": 1, "self_tube": {"id": 2}},
                {"id": 2, "self_tube": {"id": 1}},
            ])
        );
    }

    #[test]
    fn test_object_pointing_at_itself() {
        let mut graph = ResultGraph::new();
        let a = graph.insert(tube(1));
        graph
            .get_mut(a)
            .unwrap()
            .relations
            .insert("children".into(), Related::Many(vec![a]));
        graph.push_root(a);

        assert_eq!(serialize(&graph).unwrap(), json!([{"id": 1, "children": []}]));
    }

    #[test]
    fn test_siblings_serialize_independently() {
        let mut graph = ResultGraph::new();
        let shared = graph.insert(tube(9));
        let sample = graph.insert(
            Object::new("Sample", Some(vec![Value::Integer(1)]))
                .with_related("tube", Related::One(Some(shared)))
                .with_related("tubes", Related::Many(vec![shared]))
                .with_related("other", Related::One(None)),
        );
        graph.push_root(sample);

        assert_eq!(
            serialize(&graph).unwrap(),
            json!([{"other": null, "tube": {"id": 9}, "tubes": [{"id": 9}]}])
        );
    }

    #[test]
    fn test_partial_keys_are_unassigned() {
        let slot = ResultGraph::new().insert(Object::transient("Reading"));
        let partial = Object::new("Reading", Some(vec![Value::Integer(1), Value::Null]));
        assert_eq!(
            IdentityKey::of(&partial, slot),
            IdentityKey::Unassigned {
                type_name: "Reading".into(),
                slot,
            }
        );
        let keyless = Object::new("Log", Some(Vec::new()));
        assert!(matches!(IdentityKey::of(&keyless, slot), IdentityKey::Unassigned { .. }));

        let full = Object::new("Reading", Some(vec![Value::Integer(1), Value::from("a")]));
        assert_eq!(
            IdentityKey::of(&full, slot),
            IdentityKey::Persistent {
                type_name: "Reading".into(),
                key: "1.a".into(),
            }
        );
    }

    #[test]
    fn test_unsaved_objects_do_not_collide() {
        let mut graph = ResultGraph::new();
        let child = graph.insert(Object::transient("Tube").with_field("name", "b"));
        let mut parent = Object::transient("Tube").with_field("name", "a");
        parent.state = ObjectState::Pending;
        let parent = graph.insert(parent.with_related("self_tube", Related::One(Some(child))));
        graph.push_root(parent);

        assert_eq!(
            serialize(&graph).unwrap(),
            json!([{"name": "a", "self_tube": {"name": "b"}}])
        );
    }
}
