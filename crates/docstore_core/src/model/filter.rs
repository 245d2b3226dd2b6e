//! Filter object accepted by `find` and `count`.
//!
//! # Invariants
//! - A zero `limit` or `offset` behaves as if it was not given.
//! - `count` ignores `sort`, `limit` and `offset`.

use super::query::Query;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Single-key ordering, written `{ "key": "title", "dir": "desc" }` or in the
/// compact form `"-title"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SortRepr")]
pub struct Sort {
    pub key: String,
    pub dir: SortDir,
}

impl Sort {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            dir: SortDir::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParseError(String);

impl Display for SortParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid sort `{}`: key is empty", self.0)
    }
}

impl std::error::Error for SortParseError {}

impl FromStr for Sort {
    type Err = SortParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let sort = match trimmed.strip_prefix('-') {
            Some(key) => Sort::desc(key),
            None => Sort::asc(trimmed),
        };
        if sort.key.is_empty() {
            return Err(SortParseError(raw.to_string()));
        }
        Ok(sort)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SortRepr {
    Compact(String),
    Full {
        key: String,
        #[serde(default)]
        dir: SortDir,
    },
}

impl TryFrom<SortRepr> for Sort {
    type Error = SortParseError;

    fn try_from(value: SortRepr) -> Result<Self, Self::Error> {
        match value {
            SortRepr::Compact(raw) => raw.parse(),
            SortRepr::Full { key, dir } if !key.is_empty() => Ok(Sort { key, dir }),
            SortRepr::Full { key, .. } => Err(SortParseError(key)),
        }
    }
}

/// Framework-level description of a document selection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    pub query: Option<Query>,
    pub sort: Option<Sort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Case-insensitive (ASCII) substring searched in `search_fields`, or in
    /// every string value of the document when no fields are listed.
    pub search: Option<String>,
    pub search_fields: Vec<String>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn search<I, S>(mut self, text: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = Some(text.into());
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// `limit` with zero treated as absent.
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit.filter(|limit| *limit > 0)
    }

    /// `offset` with zero treated as absent.
    pub fn effective_offset(&self) -> Option<u64> {
        self.offset.filter(|offset| *offset > 0)
    }

    /// `search` with blank text treated as absent. Non-blank text is
    /// returned as given, surrounding spaces included.
    pub fn effective_search(&self) -> Option<&str> {
        self.search
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}
