//! Runtime value and row types.
//!
//! Tables are described at runtime, so rows cannot be Rust structs. A [`Row`]
//! is an insertion-ordered map from column name (alias or physical, depending
//! on which side of the translator it sits) to [`Value`]. Relation resolution
//! attaches nested rows with the [`Value::List`] and [`Value::Object`] variants.

use basemodel_types::StorageClass;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An ordered mapping of column name to value.
pub type Row = IndexMap<String, Value>;

/// A dynamically typed cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Structured JSON cell (attachments, JSON columns)
    Json(serde_json::Value),
    /// Scalar list, produced by lookups through has-many/many-to-many links
    Array(Vec<Value>),
    /// Nested related rows (`<Table>List`, `<Table>MMList`)
    List(Vec<Row>),
    /// Nested related row (`<Table>Read`)
    Object(Box<Row>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null` or the empty string; validators skip these.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Object(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            Value::List(rows) => Some(rows),
            _ => None,
        }
    }

    /// Canonical text used to match keys across result sets.
    ///
    /// Drivers disagree on whether a key comes back as `1`, `1.0` or `"1"`;
    /// grouping children onto parents must not care.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) if r.fract() == 0.0 && r.abs() < 9.0e15 => {
                Some((*r as i64).to_string())
            }
            Value::Real(r) => Some(r.to_string()),
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_json().to_string()),
        }
    }

    /// Coerces a textual value (from a filter expression or a primary key
    /// string) into the storage class of its column. Non-text values and
    /// text that does not parse are returned unchanged.
    pub fn coerce(self, class: StorageClass) -> Value {
        let Value::Text(text) = &self else {
            return self;
        };
        match class {
            StorageClass::Integer => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| text.trim().parse::<f64>().map(Value::Real))
                .unwrap_or(self),
            StorageClass::Real => text.trim().parse::<f64>().map(Value::Real).unwrap_or(self),
            StorageClass::Boolean => match text.trim() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => self,
            },
            StorageClass::Text | StorageClass::Json => self,
        }
    }

    /// Converts an inbound JSON payload value.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Real).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                if !items.is_empty() && items.iter().all(serde_json::Value::is_object) {
                    Value::List(
                        items
                            .into_iter()
                            .filter_map(|item| match item {
                                serde_json::Value::Object(map) => Some(row_from_map(map)),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Value::Array(items.into_iter().map(Value::from_json).collect())
                }
            }
            serde_json::Value::Object(map) => Value::Object(Box::new(row_from_map(map))),
        }
    }

    /// Converts to a JSON value for serialization and for binding structured
    /// values as text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(r) => serde_json::Number::from_f64(*r)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Json(json) => json.clone(),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::List(rows) => rows.iter().map(row_to_json).collect(),
            Value::Object(row) => row_to_json(row),
        }
    }

    /// Returns `true` for values that cannot be bound directly as a scalar.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            Value::Json(_) | Value::Array(_) | Value::List(_) | Value::Object(_)
        )
    }
}

/// Builds a [`Row`] from a JSON object.
pub fn row_from_map(map: serde_json::Map<String, serde_json::Value>) -> Row {
    map.into_iter()
        .map(|(key, value)| (key, Value::from_json(value)))
        .collect()
}

/// Builds a [`Row`] from any JSON value; non-objects yield an empty row.
pub fn row_from_json(json: serde_json::Value) -> Row {
    match json {
        serde_json::Value::Object(map) => row_from_map(map),
        _ => Row::new(),
    }
}

/// Renders a [`Row`] as a JSON object.
pub fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => f.write_str(&String::from_utf8_lossy(b)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Value::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from_json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_string_ignores_numeric_representation() {
        assert_eq!(Value::Integer(7).key_string(), Value::Real(7.0).key_string());
        assert_eq!(Value::Text("7".into()).key_string().as_deref(), Some("7"));
        assert_eq!(Value::Null.key_string(), None);
    }

    #[test]
    fn coerce_by_storage_class() {
        assert_eq!(Value::from("42").coerce(StorageClass::Integer), Value::Integer(42));
        assert_eq!(Value::from("4.5").coerce(StorageClass::Integer), Value::Real(4.5));
        assert_eq!(Value::from("true").coerce(StorageClass::Boolean), Value::Bool(true));
        assert_eq!(Value::from("abc").coerce(StorageClass::Integer), Value::from("abc"));
        assert_eq!(Value::from("42").coerce(StorageClass::Text), Value::from("42"));
    }

    #[test]
    fn json_arrays_of_objects_become_rows() {
        let value = Value::from_json(json!([{"id": 1}, {"id": 2}]));
        let rows = value.as_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], Value::Integer(2));

        let scalars = Value::from_json(json!([1, "a"]));
        assert_eq!(scalars, Value::Array(vec![Value::Integer(1), Value::from("a")]));
    }

    #[test]
    fn json_round_trip_keeps_order() {
        let input = json!({"b": 1, "a": [{"x": null}], "c": {"d": true}});
        let row = row_from_json(input.clone());
        assert_eq!(row.keys().collect::<Vec<_>>(), ["b", "a", "c"]);
        assert_eq!(row_to_json(&row), input);
    }

    #[test]
    fn blank_values() {
        assert!(Value::Null.is_blank());
        assert!(Value::from("").is_blank());
        assert!(!Value::Integer(0).is_blank());
    }
}
