//! The dynamic value type used for every query filter, document and command body.
//!
//! [`Value`] is a small tagged union mirroring the scalar and container types that can
//! travel to and from the server. Maps are keyed by string and unordered from the
//! server's point of view; a [`BTreeMap`] keeps them deterministic on our side.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Map variant payload.
pub type ValueMap = BTreeMap<String, Value>;

/// A dynamically typed document value.
///
/// # Example
///
/// ```
/// use reactmongo_core::value::Value;
///
/// let filter = Value::map([("_id", Value::from("documentid"))]);
/// assert_eq!(filter.get("_id").and_then(Value::as_str), Some("documentid"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or explicit null
    #[default]
    Null,
    Bool(bool),
    /// Any integer; narrowed to 32 bits on the wire when it fits
    Int(i64),
    Double(f64),
    String(String),
    /// Ordered sequence, also the shape of every query result
    Array(Vec<Value>),
    /// String-keyed document
    Map(ValueMap),
}

impl Value {
    /// Builds a map value from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds an empty map value.
    pub fn empty_map() -> Self {
        Value::Map(ValueMap::new())
    }

    /// Whether this is [`Null`](Value::Null), which is also what absent fields read as.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value counts as "true" in a status field.
    ///
    /// Null, `false`, zero numbers and empty strings are falsy; containers are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0 && !d.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Map(_) => true,
        }
    }

    /// Looks up a key when the value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// The integer payload, if this is an [`Int`](Value::Int).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric payload as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The text payload, if this is a [`String`](Value::String).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The elements, if this is an [`Array`](Value::Array).
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a [`Map`](Value::Map).
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Double),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            // Non-finite doubles have no JSON form
            Value::Double(d) => serde_json::Number::from_f64(d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Value::Null, false)]
    #[case(Value::Bool(false), false)]
    #[case(Value::Bool(true), true)]
    #[case(Value::Int(0), false)]
    #[case(Value::Int(1), true)]
    #[case(Value::Double(0.0), false)]
    #[case(Value::Double(1.0), true)]
    #[case(Value::from(""), false)]
    #[case(Value::from("yes"), true)]
    #[case(Value::empty_map(), true)]
    fn truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[test]
    fn converts_from_json() {
        let value = Value::from(json!({
            "name": "Alice",
            "age": 30,
            "score": 1.5,
            "tags": ["a", null],
        }));

        assert_eq!(value.get("name").and_then(Value::as_str), Some("Alice"));
        assert_eq!(value.get("age").and_then(Value::as_i64), Some(30));
        assert_eq!(value.get("score").and_then(Value::as_f64), Some(1.5));
        assert_eq!(
            value.get("tags").and_then(Value::as_array),
            Some(&[Value::from("a"), Value::Null][..])
        );
    }

    #[test]
    fn accessors_only_match_their_variant() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Double(2.0).as_i64(), None);
        assert_eq!(Value::from("1").as_i64(), None);
        assert_eq!(Value::Int(1).as_str(), None);
        assert_eq!(Value::empty_map().as_array(), None);
        assert_eq!(Value::Array(Vec::new()).as_map(), None);
    }

    #[test]
    fn converts_to_json() {
        let value = Value::map([
            ("nested", Value::map([("n", Value::Int(1))])),
            ("nan", Value::Double(f64::NAN)),
        ]);

        assert_eq!(
            serde_json::Value::from(value),
            json!({ "nested": { "n": 1 }, "nan": null })
        );
    }

    #[test]
    fn serde_is_untagged() {
        let value: Value = serde_json::from_str(r#"{"a":[1,2.5,"x",true,null]}"#).unwrap();

        assert_eq!(
            value,
            Value::map([(
                "a",
                Value::Array(vec![
                    Value::Int(1),
                    Value::Double(2.5),
                    Value::from("x"),
                    Value::Bool(true),
                    Value::Null,
                ])
            )])
        );
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":[1,2.5,"x",true,null]}"#);
    }
}
