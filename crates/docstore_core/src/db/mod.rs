//! SQLite connection bootstrap and database/table catalog.
//!
//! # Responsibility
//! - Open and configure the single SQLite connection used by the adapter.
//! - List and lazily create databases (attached schemas) and tables.
//!
//! # Invariants
//! - Database and table names match `[A-Za-z0-9_-]+` before they reach SQL.
//! - Every table has the `(id TEXT PRIMARY KEY, doc TEXT NOT NULL)` shape.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod catalog;
mod open;

pub use catalog::{create_database, create_table, list_databases, list_tables, validate_name};
pub use open::open_connection;

pub type DbResult<T> = Result<T, DbError>;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    InvalidName { kind: &'static str, name: String },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::InvalidName { kind, name } => write!(
                f,
                "{kind} name `{name}` invalid (use A-Z, a-z, 0-9, _ and - only)"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::InvalidName { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Connection options handed to the adapter at construction time.
///
/// `data_dir = None` keeps every database in memory; otherwise each database
/// lives in `<data_dir>/<database>.sqlite3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    pub data_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ConnectOptions {
    /// In-memory options with default timeouts.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed options rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Parses options from a JSON object; missing keys take defaults.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Location passed to `ATTACH DATABASE` for `database`.
    pub fn database_location(&self, database: &str) -> String {
        match &self.data_dir {
            Some(dir) => dir
                .join(format!("{database}.sqlite3"))
                .to_string_lossy()
                .into_owned(),
            None => ":memory:".to_string(),
        }
    }
}
