//! Partial-update payloads.
//!
//! # Responsibility
//! - Turn a plain object, or an object wrapped in `$set` / `$inc` operator
//!   envelopes, into an ordered list of field operations.
//! - Apply those operations to a document.
//!
//! # Invariants
//! - Setting an object onto an object merges recursively; any other value
//!   replaces the target.
//! - The primary key never changes through an update.
//! - Payload keys are literal top-level keys; only the builder methods
//!   read dots as path separators.

use super::document::{Document, FieldPath, FieldPathError, ID_FIELD};
use serde_json::{Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

const SET_ENVELOPE: &str = "$set";
const INC_ENVELOPE: &str = "$inc";

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(Value),
    Increment(Number),
}

/// Target of an [`UpdateOp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateField {
    /// Dotted path, `author.name`.
    Path(String),
    /// Top-level key taken verbatim, dots included.
    Key(String),
}

impl UpdateField {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(field) | Self::Key(field) => field,
        }
    }

    fn resolve(&self) -> Result<FieldPath, FieldPathError> {
        match self {
            Self::Path(field) => FieldPath::parse(field),
            Self::Key(key) => FieldPath::key(key),
        }
    }
}

/// Per-document update failure.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateError {
    InvalidField(FieldPathError),
    IdChange { from: Value, to: Value },
    MissingField(String),
    NotANumber { field: String, found: Value },
    /// An operator envelope whose value is not an object.
    InvalidEnvelope { envelope: String, found: Value },
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::IdChange { from, to } => write!(
                f,
                "primary key `{ID_FIELD}` cannot be changed (from {from} to {to})"
            ),
            Self::MissingField(field) => write!(f, "no attribute `{field}` to increment"),
            Self::NotANumber { field, found } => {
                write!(f, "expected a number in `{field}`, found {found}")
            }
            Self::InvalidEnvelope { envelope, found } => {
                write!(f, "`{envelope}` expects an object, found {found}")
            }
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidField(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FieldPathError> for UpdateError {
    fn from(value: FieldPathError) -> Self {
        Self::InvalidField(value)
    }
}

/// Ordered list of field operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<(UpdateField, UpdateOp)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or merges into) the field at dotted path `field`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops
            .push((UpdateField::Path(field.into()), UpdateOp::Set(value.into())));
        self
    }

    /// Adds `by` to the numeric field at dotted path `field`.
    pub fn increment(mut self, field: impl Into<String>, by: impl Into<Number>) -> Self {
        self.ops
            .push((UpdateField::Path(field.into()), UpdateOp::Increment(by.into())));
        self
    }

    /// Sets (or merges into) the top-level key `key`, dots included.
    pub fn set_key(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops
            .push((UpdateField::Key(key.into()), UpdateOp::Set(value.into())));
        self
    }

    /// Adds `by` to the numeric top-level key `key`, dots included.
    pub fn increment_key(mut self, key: impl Into<String>, by: impl Into<Number>) -> Self {
        self.ops
            .push((UpdateField::Key(key.into()), UpdateOp::Increment(by.into())));
        self
    }

    pub fn ops(&self) -> &[(UpdateField, UpdateOp)] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the updated copy of `doc`.
    pub fn apply(&self, doc: &Document) -> Result<Document, UpdateError> {
        let mut next = doc.clone();

        for (field, op) in &self.ops {
            let path = field.resolve()?;
            match op {
                UpdateOp::Set(value) => set_merged(&mut next, &path, value.clone()),
                UpdateOp::Increment(by) => {
                    let current = path
                        .lookup(&next)
                        .ok_or_else(|| UpdateError::MissingField(field.as_str().to_string()))?;
                    let sum = add_numbers(current, by).ok_or_else(|| UpdateError::NotANumber {
                        field: field.as_str().to_string(),
                        found: current.clone(),
                    })?;
                    path.assign(&mut next, Value::Number(sum));
                }
            }
        }

        let before = doc.get(ID_FIELD);
        let after = next.get(ID_FIELD);
        if before != after {
            return Err(UpdateError::IdChange {
                from: before.cloned().unwrap_or(Value::Null),
                to: after.cloned().unwrap_or(Value::Null),
            });
        }

        Ok(next)
    }
}

/// Builds an update from a payload object.
///
/// A `$set` envelope is unwrapped into set operations and a `$inc` envelope
/// into increments. Non-numeric `$inc` values are kept as plain sets. Every
/// key is taken literally, so `{"a.b": 1}` targets the key `a.b`.
impl TryFrom<Document> for Update {
    type Error = UpdateError;

    fn try_from(payload: Document) -> Result<Self, Self::Error> {
        let mut update = Update::new();
        for (key, value) in payload {
            match (key.as_str(), value) {
                (SET_ENVELOPE, Value::Object(fields)) => {
                    for (field, value) in fields {
                        update = update.set_key(field, value);
                    }
                }
                (INC_ENVELOPE, Value::Object(fields)) => {
                    for (field, value) in fields {
                        update = match value {
                            Value::Number(by) => update.increment_key(field, by),
                            other => update.set_key(field, other),
                        };
                    }
                }
                (SET_ENVELOPE | INC_ENVELOPE, found) => {
                    return Err(UpdateError::InvalidEnvelope {
                        envelope: key,
                        found,
                    });
                }
                (_, value) => update = update.set_key(key, value),
            }
        }
        Ok(update)
    }
}

fn set_merged(doc: &mut Document, path: &FieldPath, value: Value) {
    let value = match (path.lookup(doc), value) {
        (Some(Value::Object(existing)), Value::Object(patch)) => {
            let mut merged = existing.clone();
            merge_objects(&mut merged, patch);
            Value::Object(merged)
        }
        (_, value) => value,
    };
    path.assign(doc, value);
}

fn merge_objects(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_objects(existing, nested)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn add_numbers(current: &Value, by: &Number) -> Option<Number> {
    let Value::Number(current) = current else {
        return None;
    };
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Some(Number::from(sum));
        }
    }
    Number::from_f64(current.as_f64()? + by.as_f64()?)
}

#[cfg(test)]
mod tests {
    use super::{Update, UpdateError, UpdateField, UpdateOp};
    use crate::model::document::Document;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn set_envelope_is_unwrapped() {
        let update =
            Update::try_from(doc(json!({"$set": {"title": "Hello 2", "votes": 3}}))).unwrap();
        assert_eq!(
            update.ops(),
            [
                (UpdateField::Key("title".to_string()), UpdateOp::Set(json!("Hello 2"))),
                (UpdateField::Key("votes".to_string()), UpdateOp::Set(json!(3))),
            ]
        );
    }

    #[test]
    fn inc_envelope_becomes_increments() {
        let update = Update::try_from(doc(json!({"$inc": {"votes": -1}}))).unwrap();
        let next = update.apply(&doc(json!({"id": 1, "votes": 3}))).unwrap();
        assert_eq!(next["votes"], json!(2));
    }

    #[test]
    fn plain_object_merges_nested_objects() {
        let current = doc(json!({"id": 1, "author": {"name": "Ada", "age": 36}, "tags": ["a"]}));
        let update = Update::try_from(doc(json!({"author": {"age": 37}, "tags": ["b"]}))).unwrap();

        let next = update.apply(&current).unwrap();
        assert_eq!(
            next,
            doc(json!({"id": 1, "author": {"name": "Ada", "age": 37}, "tags": ["b"]}))
        );
    }

    #[test]
    fn increment_handles_integers_and_floats() {
        let current = doc(json!({"id": 1, "votes": 2, "score": 1.5}));
        let next = Update::new()
            .increment("votes", 1)
            .increment("score", serde_json::Number::from_f64(0.25).unwrap())
            .apply(&current)
            .unwrap();
        assert_eq!(next["votes"], json!(3));
        assert_eq!(next["score"], json!(1.75));
    }

    #[test]
    fn increment_rejects_missing_and_non_numeric_fields() {
        let current = doc(json!({"id": 1, "title": "x"}));
        assert_eq!(
            Update::new().increment("votes", 1).apply(&current),
            Err(UpdateError::MissingField("votes".to_string()))
        );
        assert!(matches!(
            Update::new().increment("title", 1).apply(&current),
            Err(UpdateError::NotANumber { .. })
        ));
    }

    #[test]
    fn primary_key_cannot_change() {
        let current = doc(json!({"id": 1}));
        let err = Update::new().set("id", 2).apply(&current).unwrap_err();
        assert!(matches!(err, UpdateError::IdChange { .. }));
        Update::new().set("id", 1).apply(&current).unwrap();
    }

    #[test]
    fn payload_keys_with_dots_stay_literal() {
        let current = doc(json!({"id": 1, "a.b": 1, "stats": {"x.y": 1}}));
        let update = Update::try_from(doc(json!({
            "$set": {"a.b": 2, "stats": {"x.y": 3}},
            "$inc": {"a.b": 1}
        })))
        .unwrap();

        let next = update.apply(&current).unwrap();
        assert_eq!(next, doc(json!({"id": 1, "a.b": 3, "stats": {"x.y": 3}})));
    }

    #[test]
    fn builder_paths_still_split_on_dots() {
        let current = doc(json!({"id": 1, "author": {"name": "Ada"}}));
        let next = Update::new()
            .set("author.name", "Grace")
            .apply(&current)
            .unwrap();
        assert_eq!(next, doc(json!({"id": 1, "author": {"name": "Grace"}})));
    }

    #[test]
    fn non_object_envelopes_are_rejected() {
        assert_eq!(
            Update::try_from(doc(json!({"$set": 5}))),
            Err(UpdateError::InvalidEnvelope {
                envelope: "$set".to_string(),
                found: json!(5),
            })
        );
        assert!(matches!(
            Update::try_from(doc(json!({"title": "x", "$inc": ["votes"]}))),
            Err(UpdateError::InvalidEnvelope { envelope, .. }) if envelope == "$inc"
        ));
    }
}
