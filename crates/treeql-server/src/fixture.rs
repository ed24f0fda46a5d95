//! JSON fixtures: a schema plus the rows to serve
//!
//! ```json
//! {
//!   "models": [
//!     {
//!       "name": "Sample",
//!       "primary_key": ["id"],
//!       "attributes": {"name": "string", "date": "date"},
//!       "relationships": {
//!         "tubes": {"target": "Tube", "cardinality": "many", "local": "id", "remote": "sample_id"}
//!       }
//!     }
//!   ],
//!   "rows": {"Sample": [{"name": "one", "date": "2017-01-01"}]}
//! }
//! ```
//!
//! Row values are converted with the same literal coercions queries use, so
//! dates, uuids and enum members are written as strings.

use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use treeql_core::{Error, Result, Value};
use treeql_engine::{MemoryEngine, Row};
use treeql_query::{CoercionRegistry, QueryFactory};
use treeql_schema::{AttributeType, Cardinality, JoinKeys, ModelDescriptor, SchemaRegistry};

/// Declared attribute type: a type key, or an enum with its members
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    Named(String),
    Enum {
        #[serde(rename = "enum")]
        members: BTreeMap<String, Json>,
    },
}

impl TypeSpec {
    fn resolve(&self) -> Result<AttributeType> {
        Ok(match self {
            TypeSpec::Named(name) => match name.as_str() {
                "integer" => AttributeType::Integer,
                "float" => AttributeType::Float,
                "string" => AttributeType::String,
                "boolean" => AttributeType::Boolean,
                "date" => AttributeType::Date,
                "datetime" => AttributeType::DateTime,
                "time" => AttributeType::Time,
                "uuid" => AttributeType::Uuid,
                "decimal" => AttributeType::Decimal,
                other => AttributeType::Custom(other.to_string()),
            },
            TypeSpec::Enum { members } => AttributeType::Enum {
                members: members
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), value_of(value)?)))
                    .collect::<Result<_>>()?,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipSpec {
    pub target: String,
    #[serde(default = "one")]
    pub cardinality: Cardinality,
    pub local: String,
    pub remote: String,
}

fn one() -> Cardinality {
    Cardinality::One
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, TypeSpec>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipSpec>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl ModelSpec {
    fn descriptor(&self) -> Result<ModelDescriptor> {
        let mut model = ModelDescriptor::new(&self.name);
        for (name, ty) in &self.attributes {
            model = model.attribute(name, ty.resolve()?);
        }
        for column in &self.primary_key {
            model = model.primary_key(column);
        }
        for (name, rel) in &self.relationships {
            let join = JoinKeys::new(&rel.local, &rel.remote);
            model = match rel.cardinality {
                Cardinality::One => model.has_one(name, &rel.target, join),
                Cardinality::Many => model.has_many(name, &rel.target, join),
            };
        }
        if let Some(parent) = &self.parent {
            model = model.variant_of(parent);
        }
        Ok(model)
    }
}

/// A schema and its rows
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub models: Vec<ModelSpec>,

    /// Rows per model, inserted model by model in name order
    #[serde(default)]
    pub rows: BTreeMap<String, Vec<serde_json::Map<String, Json>>>,
}

impl Fixture {
    /// Parse a fixture document; the top level must be a JSON object
    pub fn parse(text: &str) -> Result<Self> {
        let document: Json = serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid fixture: {}", e)))?;
        if !document.is_object() {
            return Err(Error::Configuration(
                "invalid fixture: expected a JSON object".to_string(),
            ));
        }
        serde_json::from_value(document)
            .map_err(|e| Error::Configuration(format!("invalid fixture: {}", e)))
    }

    /// Read and parse a fixture file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Build and validate the schema
    pub fn registry(&self) -> Result<SchemaRegistry> {
        let models = self
            .models
            .iter()
            .map(ModelSpec::descriptor)
            .collect::<Result<Vec<_>>>()?;
        SchemaRegistry::builder().models(models).build()
    }

    /// Build the schema and load every row into a fresh engine
    pub fn into_factory(self, coercions: CoercionRegistry) -> Result<QueryFactory<MemoryEngine>> {
        let registry = Arc::new(self.registry()?);
        let engine = MemoryEngine::new(Arc::clone(&registry));

        let mut loaded = 0;
        for (model, rows) in &self.rows {
            for (index, fields) in rows.iter().enumerate() {
                let row = row_of(&registry, &coercions, model, fields)
                    .map_err(|e| Error::Configuration(format!("{} row {}: {}", model, index, e)))?;
                engine.insert(model, row)?;
                loaded += 1;
            }
            debug!("Loaded {} {} rows", rows.len(), model);
        }

        info!("Fixture loaded: {} models, {} rows", registry.len(), loaded);
        Ok(QueryFactory::new(registry, Arc::new(engine)).with_coercions(coercions))
    }
}

fn row_of(
    registry: &SchemaRegistry,
    coercions: &CoercionRegistry,
    model: &str,
    fields: &serde_json::Map<String, Json>,
) -> Result<Row> {
    fields
        .iter()
        .map(|(column, json)| {
            let attribute = registry.get_attribute(model, column)?;
            let value = coercions.coerce(attribute, &value_of(json)?)?;
            Ok((column.clone(), value))
        })
        .collect()
}

fn value_of(json: &Json) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(value_of).collect::<Result<_>>()?),
        Json::Object(_) => {
            return Err(Error::Configuration("nested objects are not column values".to_string()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LAB: &str = r#"{
        "models": [
            {
                "name": "Sample",
                "primary_key": ["id"],
                "attributes": {"name": "string", "date": "date"},
                "relationships": {
                    "tubes": {"target": "Tube", "cardinality": "many", "local": "id", "remote": "sample_id"}
                }
            },
            {
                "name": "Tube",
                "primary_key": ["id"],
                "attributes": {
                    "name": "string",
                    "sample_id": "integer",
                    "state": {"enum": {"frozen": 1, "thawed": 2}}
                },
                "relationships": {
                    "sample": {"target": "Sample", "local": "sample_id", "remote": "id"}
                }
            },
            {
                "name": "CryoTube",
                "parent": "Tube",
                "attributes": {"temperature": "float"}
            }
        ],
        "rows": {
            "Sample": [
                {"name": "one", "date": "2017-01-01"},
                {"name": "two", "date": "2017-02-01"}
            ],
            "Tube": [
                {"id": 1, "name": "t1", "sample_id": 1, "state": "frozen"},
                {"id": 2, "name": "t2", "sample_id": 2, "state": "thawed"}
            ]
        }
    }"#;

    #[test]
    fn test_schema_from_fixture() {
        let registry = Fixture::parse(LAB).unwrap().registry().unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.get_relationship("Sample", "tubes").unwrap().is_many());
        assert!(!registry.get_relationship("Tube", "sample").unwrap().is_many());
        assert_eq!(
            registry.get_attribute("Sample", "date").unwrap().ty,
            AttributeType::Date
        );
        assert!(registry.is_variant_of("CryoTube", "Tube"));
    }

    #[test]
    fn test_rows_are_coerced_and_queryable() {
        let factory = Fixture::parse(LAB)
            .unwrap()
            .into_factory(CoercionRegistry::default())
            .unwrap();
        assert_eq!(factory.engine().count("Sample").unwrap(), 2);

        let document = factory
            .parse_query("query Sample {\n  date [* > '2017-01-15']\n  tubes {\n    name\n  }\n}")
            .unwrap();
        assert_eq!(document.as_array().unwrap().len(), 1);
        assert_eq!(document[0]["name"], json!("two"));
        assert_eq!(document[0]["date"], json!("2017-02-01"));
        assert_eq!(document[0]["tubes"][0]["state"], json!(2));

        // A serialized enum value works as a filter literal
        let by_value = factory.parse_query("query Tube {\n  state [* == 2]\n}").unwrap();
        let by_name = factory.parse_query("query Tube {\n  state [* == 'thawed']\n}").unwrap();
        assert_eq!(by_value, by_name);
        assert_eq!(by_value.as_array().unwrap().len(), 1);
        assert_eq!(by_value[0]["name"], json!("t2"));
    }

    #[test]
    fn test_bad_rows_are_reported() {
        let fixture = Fixture::parse(
            r#"{"models": [{"name": "Sample", "primary_key": ["id"], "attributes": {"date": "date"}}],
                "rows": {"Sample": [{"date": "yesterday"}]}}"#,
        )
        .unwrap();
        let err = fixture.into_factory(CoercionRegistry::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.starts_with("Sample row 0")));

        let fixture = Fixture::parse(
            r#"{"models": [{"name": "Sample", "primary_key": ["id"]}],
                "rows": {"Sample": [{"colour": "red"}]}}"#,
        )
        .unwrap();
        assert!(fixture.into_factory(CoercionRegistry::default()).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(LAB.as_bytes()).unwrap();
        let fixture = Fixture::from_file(file.path()).unwrap();
        assert_eq!(fixture.models.len(), 3);
        assert_eq!(fixture.rows["Tube"].len(), 2);
    }

    #[test]
    fn test_top_level_must_be_an_object() {
        for text in ["[]", "[[], {}]", "null", "3"] {
            assert!(
                matches!(Fixture::parse(text), Err(Error::Configuration(_))),
                "accepted {}",
                text
            );
        }
        assert!(Fixture::parse("{}").unwrap().models.is_empty());
    }
}
