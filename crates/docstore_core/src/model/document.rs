//! Document records and field addressing.
//!
//! # Responsibility
//! - Define the opaque key-value record the adapter stores and returns.
//! - Address (possibly nested) document fields by dotted path.
//!
//! # Invariants
//! - Every stored document carries its primary key under [`ID_FIELD`].
//! - A `FieldPath` never has empty segments or segments containing `"`.

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Schema-free record. Keys are ordered, which keeps serialized text stable.
pub type Document = Map<String, Value>;

/// Primary key value. Strings and numbers are accepted as keys.
pub type DocId = Value;

/// Native primary key field of every stored document.
pub const ID_FIELD: &str = "id";

/// Returns the primary key of `doc`, if present.
pub fn doc_id(doc: &Document) -> Option<&DocId> {
    doc.get(ID_FIELD)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPathError {
    pub path: String,
    pub reason: &'static str,
}

impl Display for FieldPathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid field path `{}`: {}", self.path, self.reason)
    }
}

impl Error for FieldPathError {}

/// Dotted path into a document, e.g. `author.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path.
    ///
    /// # Errors
    /// - Empty paths, empty segments (`a..b`) and segments containing `"`.
    pub fn parse(raw: &str) -> Result<Self, FieldPathError> {
        Self::from_segments(raw.split('.').map(str::to_string).collect()).map_err(|reason| {
            FieldPathError {
                path: raw.to_string(),
                reason,
            }
        })
    }

    /// Builds a single-segment path from a literal key (no dot splitting).
    pub fn key(key: &str) -> Result<Self, FieldPathError> {
        Self::from_segments(vec![key.to_string()]).map_err(|reason| FieldPathError {
            path: key.to_string(),
            reason,
        })
    }

    /// Returns a new path with `key` appended as a literal segment.
    pub fn child(&self, key: &str) -> Result<Self, FieldPathError> {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Self::from_segments(segments).map_err(|reason| FieldPathError {
            path: format!("{self}.{key}"),
            reason,
        })
    }

    fn from_segments(segments: Vec<String>) -> Result<Self, &'static str> {
        for segment in &segments {
            if segment.is_empty() {
                return Err("path has an empty segment");
            }
            if segment.contains('"') {
                return Err("path segments cannot contain `\"`");
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// SQLite JSON path form: `$."author"."name"`.
    pub fn json_path(&self) -> String {
        let mut path = String::from("$");
        for segment in &self.segments {
            path.push_str(".\"");
            path.push_str(segment);
            path.push('"');
        }
        path
    }

    /// Whether this path addresses the top-level primary key.
    pub fn is_id(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == ID_FIELD
    }

    /// Reads the value at this path.
    pub fn lookup<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = doc.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes `value` at this path, creating intermediate objects and
    /// replacing non-object intermediates.
    pub fn assign(&self, doc: &mut Document, value: Value) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };
        let mut current = doc;
        for segment in parents {
            let slot = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert(last.clone(), value);
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}
