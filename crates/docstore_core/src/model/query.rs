//! Query predicates accepted by `find`, `count`, `update_many` and friends.
//!
//! Two shapes are supported. An object matches documents containing the same
//! fields with equal values (nested objects match recursively). A row
//! predicate is built in code:
//!
//! ```
//! use docstore_core::row;
//!
//! let popular = row("votes").gt(2) & !row("status").eq(false);
//! # let _ = popular;
//! ```

use super::document::Document;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::ops::{BitAnd, BitOr, Not};

/// Filter predicate for selecting documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Object-subset match. An empty object matches every document.
    Match(Document),
    /// Row predicate built with [`row`].
    Expr(Predicate),
}

impl Query {
    /// Query matching every document.
    pub fn all() -> Self {
        Self::Match(Document::new())
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Document> for Query {
    fn from(value: Document) -> Self {
        Self::Match(value)
    }
}

impl From<Predicate> for Query {
    fn from(value: Predicate) -> Self {
        Self::Expr(value)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Document::deserialize(deserializer).map(Self::Match)
    }
}

/// Comparison operator of a row predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// Row predicate tree.
///
/// Field names are dotted paths and are validated when the query is compiled,
/// so building a predicate never fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: CmpOp,
        value: Value,
    },
    HasField(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjunction; nested conjunctions are flattened.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), right) => {
                left.push(right);
                Predicate::And(left)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    /// Disjunction; nested disjunctions are flattened.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), right) => {
                left.push(right);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        self.or(rhs)
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

/// Handle on one field of the current row.
#[derive(Debug, Clone)]
pub struct Row {
    field: String,
}

/// Starts a row predicate on `field` (dotted path).
pub fn row(field: impl Into<String>) -> Row {
    Row {
        field: field.into(),
    }
}

impl Row {
    fn compare(self, op: CmpOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            field: self.field,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Ne, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Ge, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CmpOp::Le, value)
    }

    pub fn has_field(self) -> Predicate {
        Predicate::HasField(self.field)
    }

    /// Field name this handle points at.
    pub fn field(&self) -> &str {
        &self.field
    }
}
