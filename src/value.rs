//! The dynamically typed configuration value and its tree form.
//!
//! A configuration tree is a [`Table`] mapping string keys to [`Value`]s,
//! where a value may itself be a table. The variant set is closed: sources
//! hand the accessor plain data (parsed scalars, arrays, nested tables), so
//! the tree is acyclic by construction and `Clone` performs a full deep copy.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

mod ser;

pub use ser::to_value;

/// A nested configuration tree.
pub type Table = BTreeMap<String, Value>;

/// A single configuration value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Explicit absence; produced by sources that emit null and by merge
    /// overrides. Reads treat it as missing.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Int(i64),
    /// Unsigned integer scalar.
    Uint(u64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// A span of time.
    Duration(Duration),
    /// A point in time.
    Timestamp(SystemTime),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Nested tree.
    Table(Table),
}

impl Value {
    /// Construct an empty nested table.
    #[must_use]
    pub fn empty_table() -> Self {
        Self::Table(Table::new())
    }

    /// `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `true` for [`Value::Table`].
    #[must_use]
    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }

    /// Whether the value counts as "empty" for presence checks: null, the
    /// empty string, an empty array, or an empty table. Zero numbers and
    /// `false` are not empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Table(table) => table.is_empty(),
            _ => false,
        }
    }

    /// Borrow the nested table, if this is one.
    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Mutably borrow the nested table, if this is one.
    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Borrow the array, if this is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the string scalar, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Duration(_) => "duration",
            Self::Timestamp(_) => "timestamp",
            Self::Array(_) => "array",
            Self::Table(_) => "table",
        }
    }
}

macro_rules! from_signed {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Self::Int(i64::from(n))
            }
        }
    )*};
}

macro_rules! from_unsigned {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Self::Uint(u64::from(n))
            }
        }
    )*};
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Self::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<SystemTime> for Value {
    fn from(t: SystemTime) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => Self::Table(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Convert a parsed JSON object into a [`Table`].
///
/// Non-object JSON values produce an empty table; sources always hand the
/// accessor a mapping at the top level.
#[must_use]
pub fn table_from_json(json: serde_json::Value) -> Table {
    match Value::from(json) {
        Value::Table(table) => table,
        _ => Table::new(),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Uint(n) => serializer.serialize_u64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Duration(d) => {
                serializer.serialize_str(&humantime::format_duration(*d).to_string())
            }
            Self::Timestamp(t) => {
                serializer.serialize_str(&humantime::format_rfc3339(*t).to_string())
            }
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Table(table) => {
                let mut map = serializer.serialize_map(Some(table.len()))?;
                for (key, value) in table {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emptiness_tracks_variant_contents() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::Array(Vec::new()).is_empty());
        assert!(Value::empty_table().is_empty());
        assert!(!Value::from(0).is_empty());
        assert!(!Value::from(false).is_empty());
        assert!(!Value::from("x").is_empty());
    }

    #[test]
    fn json_interop_preserves_structure() {
        let table = table_from_json(json!({
            "server": {"port": 8080, "hosts": ["a", "b"]},
            "debug": true,
            "ratio": 0.5,
            "label": null,
        }));
        let server = table.get("server").and_then(Value::as_table).unwrap();
        assert_eq!(server.get("port"), Some(&Value::Int(8080)));
        assert_eq!(
            server.get("hosts"),
            Some(&Value::Array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(table.get("debug"), Some(&Value::Bool(true)));
        assert_eq!(table.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(table.get("label"), Some(&Value::Null));
    }
}
