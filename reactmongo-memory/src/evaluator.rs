//! Filter evaluation for in-memory documents.
//!
//! This module interprets MongoDB-style filter documents against BSON documents,
//! supporting field equality, dotted paths, the comparison operators and the
//! `$and` / `$or` / `$nor` combinators.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use reactmongo_core::error::{DriverError, DriverResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1`, `1_i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Types with no meaningful comparison; never equal to anything
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Opaque,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::ObjectId(id), Comparable::String(hex))
            | (Comparable::String(hex), Comparable::ObjectId(id)) => parse_object_id(hex) == Some(*id),
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::String(b)) => a.partial_cmp(&parse_object_id(b)?),
            (Comparable::String(a), Comparable::ObjectId(b)) => parse_object_id(a)?.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Object ids leave the driver as their hex text, so that text has to find them again.
fn parse_object_id(hex: &str) -> Option<ObjectId> {
    ObjectId::parse_str(hex).ok()
}

/// Whether two BSON values are equal under query semantics.
pub(crate) fn bson_eq(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Resolves a dotted path such as `address.city` or `tags.0` inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Evaluates filter documents against a single document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether the document satisfies every clause of `filter`.
    pub fn matches(&self, filter: &Document) -> DriverResult<bool> {
        for (key, condition) in filter {
            let satisfied = match key.as_str() {
                "$and" => self.combine(key, condition)?.iter().all(|m| *m),
                "$or" => self.combine(key, condition)?.iter().any(|m| *m),
                "$nor" => !self.combine(key, condition)?.iter().any(|m| *m),
                operator if operator.starts_with('$') => {
                    return Err(DriverError::Operation(format!(
                        "unknown top level operator: {operator}"
                    )));
                }
                field => self.matches_field(field, condition)?,
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn combine(&self, operator: &str, clauses: &Bson) -> DriverResult<Vec<bool>> {
        match clauses {
            Bson::Array(items) if !items.is_empty() => items
                .iter()
                .map(|clause| match clause {
                    Bson::Document(filter) => self.matches(filter),
                    _ => Err(DriverError::Operation(format!(
                        "{operator} argument's entries must be objects"
                    ))),
                })
                .collect(),
            _ => Err(DriverError::Operation(format!(
                "{operator} argument must be a non-empty array"
            ))),
        }
    }

    fn matches_field(&self, field: &str, condition: &Bson) -> DriverResult<bool> {
        let value = lookup(self.document, field);

        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                for (operator, operand) in operators {
                    if !Self::apply_operator(value, operator, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(Self::equals(value, condition)),
        }
    }

    /// Equality as queries see it: a missing field equals null, and an array field
    /// matches when any of its elements does.
    fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
        match value {
            None => matches!(expected, Bson::Null),
            Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
                items.iter().any(|item| bson_eq(item, expected))
            }
            Some(actual) => bson_eq(actual, expected),
        }
    }

    fn compare(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let operand = Comparable::from(operand);

        match value {
            Some(Bson::Array(items)) => items
                .iter()
                .any(|item| Comparable::from(item).partial_cmp(&operand).is_some_and(accept)),
            Some(actual) => Comparable::from(actual)
                .partial_cmp(&operand)
                .is_some_and(accept),
            None => false,
        }
    }

    fn apply_operator(value: Option<&Bson>, operator: &str, operand: &Bson) -> DriverResult<bool> {
        Ok(match operator {
            "$eq" => Self::equals(value, operand),
            "$ne" => !Self::equals(value, operand),
            "$gt" => Self::compare(value, operand, |o| o == Ordering::Greater),
            "$gte" => Self::compare(value, operand, |o| o != Ordering::Less),
            "$lt" => Self::compare(value, operand, |o| o == Ordering::Less),
            "$lte" => Self::compare(value, operand, |o| o != Ordering::Greater),
            "$in" | "$nin" => {
                let Bson::Array(candidates) = operand else {
                    return Err(DriverError::Operation(format!("{operator} needs an array")));
                };
                let found = candidates
                    .iter()
                    .any(|candidate| Self::equals(value, candidate));

                if operator == "$in" { found } else { !found }
            }
            "$exists" => value.is_some() == Comparable::from(operand).truthy(),
            _ => {
                return Err(DriverError::Operation(format!("unknown operator: {operator}")));
            }
        })
    }
}

impl Comparable<'_> {
    fn truthy(&self) -> bool {
        match self {
            Comparable::Null | Comparable::Opaque => false,
            Comparable::Bool(b) => *b,
            Comparable::Number(n) => *n != 0.0,
            _ => true,
        }
    }
}

/// Whether a document is a set of `$`-operators rather than a literal value.
pub(crate) fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}
