//! Conversion between [`Value`] and the BSON wire representation.
//!
//! Encoding is only meaningful for array and map values at the top level: the wire
//! layer carries documents, so a bare scalar encodes to an empty document. Decoding is
//! total; wire types with no [`Value`] counterpart decode to [`Value::Null`].

use bson::{Bson, Document};

use crate::value::{Value, ValueMap};

/// Encodes a top-level value.
///
/// Arrays become [`Bson::Array`], maps become [`Bson::Document`], anything else becomes
/// an empty document.
pub fn encode(value: Value) -> Bson {
    match value {
        Value::Array(items) => Bson::Array(items.into_iter().map(encode_element).collect()),
        Value::Map(map) => Bson::Document(encode_map(map)),
        _ => Bson::Document(Document::new()),
    }
}

/// Encodes a value into the document form expected by filters, updates and commands.
///
/// Arrays use the wire array layout, a document keyed by element index.
pub fn encode_document(value: Value) -> Document {
    match value {
        Value::Map(map) => encode_map(map),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), encode_element(item)))
            .collect(),
        _ => Document::new(),
    }
}

/// Encodes a value into the documents of an insert batch.
///
/// An array inserts one document per element; anything else is a single document.
pub fn encode_batch(value: Value) -> Vec<Document> {
    match value {
        Value::Array(items) => items.into_iter().map(encode_document).collect(),
        other => vec![encode_document(other)],
    }
}

fn encode_map(map: ValueMap) -> Document {
    map.into_iter()
        .map(|(key, value)| (key, encode_element(value)))
        .collect()
}

fn encode_element(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Int(i) => match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        },
        Value::Double(d) => Bson::Double(d),
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(encode_element).collect()),
        Value::Map(map) => Bson::Document(encode_map(map)),
    }
}

/// Decodes any wire value.
pub fn decode(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Int(i as i64),
        Bson::Int64(i) => Value::Int(i),
        Bson::Double(d) => Value::Double(d),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Array(items) => Value::Array(items.into_iter().map(decode).collect()),
        Bson::Document(doc) => decode_document(doc),
        _ => Value::Null,
    }
}

/// Decodes a document into a map value.
pub fn decode_document(document: Document) -> Value {
    Value::Map(
        document
            .into_iter()
            .map(|(key, value)| (key, decode(value)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    fn nested_sample() -> Value {
        Value::map([
            ("name", Value::from("Alice")),
            ("age", Value::Int(30)),
            ("big", Value::Int(i64::from(i32::MAX) + 1)),
            ("ratio", Value::Double(0.25)),
            ("active", Value::Bool(true)),
            ("missing", Value::Null),
            (
                "tags",
                Value::Array(vec![
                    Value::from("a"),
                    Value::map([("deep", Value::Array(vec![Value::Int(1), Value::empty_map()]))]),
                ]),
            ),
        ])
    }

    #[test]
    fn map_round_trips() {
        let value = nested_sample();

        assert_eq!(decode(encode(value.clone())), value);
    }

    #[test]
    fn array_round_trips() {
        let value = Value::Array(vec![nested_sample(), Value::Int(-7), Value::Array(vec![])]);

        assert_eq!(decode(encode(value.clone())), value);
    }

    #[test]
    fn scalars_encode_to_empty_document() {
        for scalar in [Value::Null, Value::Int(3), Value::from("x"), Value::Double(1.0)] {
            assert_eq!(encode(scalar.clone()), Bson::Document(Document::new()));
            assert!(encode_document(scalar).is_empty());
        }
    }

    #[test]
    fn integers_pick_the_narrowest_wire_type() {
        let document = encode_document(Value::map([
            ("small", Value::Int(5)),
            ("large", Value::Int(1 << 40)),
        ]));

        assert_eq!(document.get("small"), Some(&Bson::Int32(5)));
        assert_eq!(document.get("large"), Some(&Bson::Int64(1 << 40)));
    }

    #[test]
    fn arrays_use_index_keys_as_documents() {
        let document = encode_document(Value::from(vec!["a", "b"]));

        assert_eq!(document, doc! { "0": "a", "1": "b" });
    }

    #[test]
    fn batches_split_arrays() {
        let batch = encode_batch(Value::Array(vec![
            Value::map([("n", 1)]),
            Value::map([("n", 2)]),
        ]));

        assert_eq!(batch, vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        assert_eq!(encode_batch(Value::map([("n", 3)])), vec![doc! { "n": 3 }]);
    }

    #[test]
    fn unsupported_wire_types_decode_to_null() {
        let oid = ObjectId::new();
        let value = decode_document(doc! {
            "_id": oid,
            "when": bson::DateTime::now(),
            "int": 4_i32,
        });

        assert_eq!(value.get("_id"), Some(&Value::String(oid.to_hex())));
        assert_eq!(value.get("when"), Some(&Value::Null));
        assert_eq!(value.get("int"), Some(&Value::Int(4)));
    }
}
