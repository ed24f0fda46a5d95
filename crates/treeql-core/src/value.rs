//! Column and literal values
//!
//! [`Value`] is what rows store, what filter literals are coerced into, and
//! what comparisons operate on.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A value stored in a column or carried by a filter literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null/missing value
    Null,

    /// Boolean value
    Boolean(bool),

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Calendar date
    Date(NaiveDate),

    /// Timestamp in UTC
    DateTime(DateTime<Utc>),

    /// Time of day
    Time(NaiveTime),

    /// Unique identifier
    Uuid(Uuid),

    /// Fixed-point decimal
    Decimal(Decimal),

    /// Enum member: the member name and its underlying value
    Enum { name: String, value: Box<Value> },

    /// Homogeneous list of values
    List(Vec<Value>),
}

impl Value {
    /// Returns true if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if the value is a list
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as list reference
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
            Value::Uuid(_) => "uuid",
            Value::Decimal(_) => "decimal",
            Value::Enum { .. } => "enum",
            Value::List(_) => "list",
        }
    }

    /// Compare two values the way a relational engine would.
    ///
    /// Returns `None` when either side is null or the types are not
    /// comparable, which callers treat as an unknown truth value.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Enum { value, .. }, other) => value.compare(other),
            (this, Value::Enum { value, .. }) => this.compare(value),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Value::Integer(a), Value::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Value::Decimal(a), Value::Float(b)) => a.to_f64().partial_cmp(b),
            (Value::Float(a), Value::Decimal(b)) => a.partial_cmp(&b.to_f64()),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Time(t) => write!(f, "{}", t),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Enum { name, .. } => write!(f, "{}", name),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// Convenience From implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Fixed-point decimal number: `units * 10^-scale`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decimal {
    units: i128,
    scale: u32,
}

impl Decimal {
    /// Create a decimal from its unscaled units and scale
    pub fn new(units: i128, scale: u32) -> Self {
        Self { units, scale }
    }

    /// Unscaled units
    pub fn units(&self) -> i128 {
        self.units
    }

    /// Number of fractional digits
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Lossy conversion to a float
    pub fn to_f64(&self) -> f64 {
        self.units as f64 / 10f64.powi(self.scale as i32)
    }

    fn rescaled(&self, scale: u32) -> Option<i128> {
        10i128
            .checked_pow(scale - self.scale)
            .and_then(|factor| self.units.checked_mul(factor))
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Self::new(v as i128, 0)
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        match (self.rescaled(scale), other.rescaled(scale)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self
                .to_f64()
                .partial_cmp(&other.to_f64())
                .unwrap_or(Ordering::Equal),
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(format!("`{}` is not a decimal", s));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(format!("`{}` is not a decimal", s));
        }
        let units: i128 = format!("{}{}", whole, fraction)
            .parse()
            .map_err(|_| format!("`{}` is out of range", s))?;
        Ok(Self::new(
            if negative { -units } else { units },
            fraction.len() as u32,
        ))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.units);
        }
        let sign = if self.units < 0 { "-" } else { "" };
        let digits = format!("{:0>width$}", self.units.unsigned_abs(), width = self.scale as usize + 1);
        let (whole, fraction) = digits.split_at(digits.len() - self.scale as usize);
        write!(f, "{}{}.{}", sign, whole, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert!(Value::List(vec![]).is_list());
        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::String("test".into()).as_str(), Some("test"));
        assert_eq!(Value::from(vec!["a", "b"]).as_list().map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_compare_null_is_unknown() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::String("a".into()).compare(&Value::Null), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_compare_numeric_mixing() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Float(1.5)),
            Some(Ordering::Greater)
        );
        let d: Decimal = "2.50".parse().unwrap();
        assert_eq!(
            Value::Decimal(d).compare(&Value::Integer(2)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Decimal(d).compare(&Value::Decimal("2.5".parse().unwrap())),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_incompatible_types() {
        assert_eq!(Value::Integer(1).compare(&Value::String("1".into())), None);
    }

    #[test]
    fn test_compare_enum_uses_underlying_value() {
        let status = Value::Enum {
            name: "ACTIVE".into(),
            value: Box::new(Value::String("active".into())),
        };
        assert_eq!(
            status.compare(&Value::String("active".into())),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_decimal_parse_and_display() {
        let d: Decimal = "-12.045".parse().unwrap();
        assert_eq!(d.units(), -12045);
        assert_eq!(d.scale(), 3);
        assert_eq!(d.to_string(), "-12.045");
        assert_eq!("0.5".parse::<Decimal>().unwrap().to_string(), "0.5");
        assert!((d.to_f64() + 12.045).abs() < 1e-9);
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_display_list() {
        let v = Value::from(vec![1i64, 2, 3]);
        assert_eq!(v.to_string(), "[1, 2, 3]");
    }

    proptest! {
        #[test]
        fn prop_integer_compare_matches_i64(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(Value::Integer(a).compare(&Value::Integer(b)), Some(a.cmp(&b)));
            prop_assert_eq!(
                Value::Integer(b).compare(&Value::Integer(a)),
                Some(a.cmp(&b).reverse())
            );
        }

        #[test]
        fn prop_decimal_scale_does_not_change_order(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let scaled = Decimal::new(a as i128 * 100, 2);
            prop_assert_eq!(scaled.cmp(&Decimal::from(b)), a.cmp(&b));
        }
    }
}
