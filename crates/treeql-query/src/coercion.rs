//! Literal coercion keyed by declared attribute type
//!
//! Query literals are only strings, integers and booleans. Before a literal
//! is compared against a column it is adapted to the column's declared type
//! by the coercer registered under [`AttributeType::key`]. Types without a
//! registered coercer pass literals through unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use treeql_core::{Decimal, Error, Result, Value};
use treeql_schema::{AttributeDescriptor, AttributeType};
use uuid::Uuid;

/// Adapts one scalar literal to a declared type
pub type Coercer =
    Arc<dyn Fn(&AttributeType, &Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Open mapping from declared type key to coercer
#[derive(Clone)]
pub struct CoercionRegistry {
    coercers: HashMap<String, Coercer>,
}

impl fmt::Debug for CoercionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.coercers.keys().collect();
        keys.sort();
        f.debug_struct("CoercionRegistry").field("keys", &keys).finish()
    }
}

impl Default for CoercionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CoercionRegistry {
    /// A registry with no coercers
    pub fn empty() -> Self {
        Self {
            coercers: HashMap::new(),
        }
    }

    /// A registry with the built-in temporal, uuid, decimal, float and enum
    /// coercers
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("date", |_, value| match value {
            Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| e.to_string()),
            other => Ok(other.clone()),
        });
        registry.register("datetime", |_, value| match value {
            Value::String(s) => parse_datetime(s).map(Value::DateTime),
            other => Ok(other.clone()),
        });
        registry.register("time", |_, value| match value {
            Value::String(s) => NaiveTime::parse_from_str(s, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S%.f"))
                .map(Value::Time)
                .map_err(|e| e.to_string()),
            other => Ok(other.clone()),
        });
        registry.register("uuid", |_, value| match value {
            Value::String(s) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| e.to_string()),
            other => Ok(other.clone()),
        });
        registry.register("decimal", |_, value| match value {
            Value::String(s) => s.parse::<Decimal>().map(Value::Decimal),
            Value::Integer(i) => Ok(Value::Decimal(Decimal::from(*i))),
            other => Ok(other.clone()),
        });
        registry.register("float", |_, value| match value {
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::String(s) => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| e.to_string()),
            other => Ok(other.clone()),
        });
        registry.register("enum", |ty, value| {
            let AttributeType::Enum { members } = ty else {
                return Ok(value.clone());
            };
            // Members match by name first, then by underlying value
            let member = match value {
                Value::String(name) => members.get_key_value(name),
                Value::Integer(_) => None,
                other => return Ok(other.clone()),
            };
            member
                .or_else(|| members.iter().find(|(_, underlying)| *underlying == value))
                .map(|(name, underlying)| Value::Enum {
                    name: name.clone(),
                    value: Box::new(underlying.clone()),
                })
                .ok_or_else(|| format!("no member named or valued `{}`", value))
        });
        registry
    }

    /// Register (or replace) the coercer for a type key
    pub fn register<F>(&mut self, key: &str, coercer: F)
    where
        F: Fn(&AttributeType, &Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.coercers.insert(key.to_string(), Arc::new(coercer));
    }

    /// Whether a coercer is registered for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.coercers.contains_key(key)
    }

    /// Coerce `value` to the declared type of `attribute`; lists are coerced
    /// element-wise
    pub fn coerce(&self, attribute: &AttributeDescriptor, value: &Value) -> Result<Value> {
        if let Value::List(items) = value {
            return items
                .iter()
                .map(|item| self.coerce(attribute, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List);
        }

        let key = attribute.ty.key();
        let Some(coercer) = self.coercers.get(key) else {
            return Ok(value.clone());
        };
        coercer(&attribute.ty, value).map_err(|reason| Error::InvalidLiteral {
            attribute: format!("{}.{}", attribute.model, attribute.name),
            declared: key.to_string(),
            literal: format!("{} ({})", value, reason),
        })
    }
}

fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc()))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn attribute(ty: AttributeType) -> AttributeDescriptor {
        AttributeDescriptor {
            model: "Tube".into(),
            name: "field".into(),
            ty,
        }
    }

    #[test]
    fn test_date_coercion() {
        let registry = CoercionRegistry::default();
        let value = registry
            .coerce(&attribute(AttributeType::Date), &Value::from("2017-01-02"))
            .unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2017, 1, 2).unwrap()));

        let err = registry
            .coerce(&attribute(AttributeType::Date), &Value::from("02/01/2017"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLiteral { ref declared, .. } if declared == "date"));
    }

    #[test]
    fn test_list_coerced_elementwise() {
        let registry = CoercionRegistry::default();
        let value = registry
            .coerce(
                &attribute(AttributeType::Date),
                &Value::from(vec!["2017-01-02", "2018-03-04"]),
            )
            .unwrap();
        let items = value.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Value::Date(_)));
    }

    #[test]
    fn test_datetime_formats() {
        let registry = CoercionRegistry::default();
        let a = registry
            .coerce(&attribute(AttributeType::DateTime), &Value::from("2020-05-06T07:08:09Z"))
            .unwrap();
        let b = registry
            .coerce(&attribute(AttributeType::DateTime), &Value::from("2020-05-06 07:08:09"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_numeric_coercions() {
        let registry = CoercionRegistry::default();
        assert_eq!(
            registry
                .coerce(&attribute(AttributeType::Float), &Value::Integer(3))
                .unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            registry
                .coerce(&attribute(AttributeType::Decimal), &Value::from("1.50"))
                .unwrap(),
            Value::Decimal("1.5".parse().unwrap())
        );
    }

    #[test]
    fn test_enum_by_name() {
        let mut members = BTreeMap::new();
        members.insert("frozen".to_string(), Value::Integer(1));
        let ty = AttributeType::Enum { members };
        let registry = CoercionRegistry::default();

        let value = registry.coerce(&attribute(ty.clone()), &Value::from("frozen")).unwrap();
        assert!(matches!(value, Value::Enum { ref name, .. } if name == "frozen"));
        assert!(registry.coerce(&attribute(ty), &Value::from("thawed")).is_err());
    }

    #[test]
    fn test_enum_by_underlying_value() {
        let mut members = BTreeMap::new();
        members.insert("frozen".to_string(), Value::Integer(1));
        members.insert("thawed".to_string(), Value::Integer(2));
        members.insert("lost".to_string(), Value::from("L"));
        let ty = AttributeType::Enum { members };
        let registry = CoercionRegistry::default();

        let value = registry.coerce(&attribute(ty.clone()), &Value::Integer(2)).unwrap();
        assert_eq!(
            value,
            Value::Enum {
                name: "thawed".into(),
                value: Box::new(Value::Integer(2)),
            }
        );
        assert!(ty.accepts(&value));

        let value = registry.coerce(&attribute(ty.clone()), &Value::from("L")).unwrap();
        assert!(matches!(value, Value::Enum { ref name, .. } if name == "lost"));

        let err = registry.coerce(&attribute(ty), &Value::Integer(7)).unwrap_err();
        assert!(matches!(err, Error::InvalidLiteral { ref declared, .. } if declared == "enum"));
    }

    #[test]
    fn test_unregistered_type_passes_through() {
        let registry = CoercionRegistry::default();
        let value = Value::from("POINT(1 2)");
        assert_eq!(
            registry
                .coerce(&attribute(AttributeType::Custom("geo".into())), &value)
                .unwrap(),
            value
        );
        assert_eq!(
            registry
                .coerce(&attribute(AttributeType::String), &Value::Integer(1))
                .unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_custom_coercer() {
        let mut registry = CoercionRegistry::empty();
        registry.register("geo", |_, value| Ok(Value::String(format!("geo:{}", value))));
        assert!(registry.contains("geo"));
        assert!(!registry.contains("date"));
        let value = registry
            .coerce(&attribute(AttributeType::Custom("geo".into())), &Value::Integer(1))
            .unwrap();
        assert_eq!(value, Value::String("geo:1".into()));
    }
}
