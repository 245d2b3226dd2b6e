//! Store adapter contract and its SQLite document-store implementation.
//!
//! # Responsibility
//! - Define the method surface a generic store service drives.
//! - Translate filters, predicates and updates into one native query each.
//!
//! # Invariants
//! - `init` rejects schemas without a database or table name.
//! - Data operations require a live connection (`NotConnected` otherwise).
//! - Storage errors are wrapped and surfaced, never swallowed or retried.
//!
//! # See also
//! - `service::store_service` for the caller side of this contract.

use crate::db::DbError;
use crate::model::document::{DocId, Document, FieldPathError, ID_FIELD};
use crate::model::filter::Filters;
use crate::model::query::Query;
use crate::model::update::Update;
use crate::service::schema::ServiceSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cursor;
mod sqlite;

pub use cursor::{compile_query, create_cursor, Cursor, SqlFragment};
pub use sqlite::SqliteDocumentAdapter;

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug)]
pub enum AdapterError {
    MissingDatabase,
    MissingTable,
    NotInitialized,
    NotConnected,
    InvalidField(FieldPathError),
    InvalidQuery(String),
    InvalidKey(Value),
    /// A per-document write failure (duplicate key, bad update).
    Write(String),
    InvalidData(String),
    Json(serde_json::Error),
    Db(DbError),
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDatabase => {
                write!(f, "Missing `database` definition in schema of service!")
            }
            Self::MissingTable => write!(f, "Missing `table` definition in schema of service!"),
            Self::NotInitialized => write!(f, "adapter is not initialized"),
            Self::NotConnected => write!(f, "adapter is not connected"),
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidKey(key) => {
                write!(f, "primary key must be a string or a number, got {key}")
            }
            Self::Write(message) => write!(f, "{message}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidField(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for AdapterError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for AdapterError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<FieldPathError> for AdapterError {
    fn from(value: FieldPathError) -> Self {
        Self::InvalidField(value)
    }
}

/// Outcome of a multi-document write, in the shape document databases report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WriteSummary {
    pub inserted: u64,
    pub replaced: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_keys: Vec<DocId>,
}

impl WriteSummary {
    pub(crate) fn record_error(&mut self, message: String) {
        self.errors += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message);
        }
    }
}

/// Data-access surface consumed by the generic store service.
///
/// Implementations hold a single connection; they are not `Sync` and do no
/// locking of their own.
pub trait StoreAdapter {
    /// Binds the adapter to the schema's database and table.
    fn init(&mut self, schema: &ServiceSchema) -> AdapterResult<()>;
    /// Opens the connection, creating database and table when absent.
    fn connect(&mut self) -> AdapterResult<()>;
    fn disconnect(&mut self) -> AdapterResult<()>;

    fn find(&self, filters: &Filters) -> AdapterResult<Vec<Document>>;
    fn find_one(&self, query: &Query) -> AdapterResult<Option<Document>>;
    fn find_by_id(&self, id: &DocId) -> AdapterResult<Option<Document>>;
    /// Found documents in request order, each at most once.
    fn find_by_ids(&self, ids: &[DocId]) -> AdapterResult<Vec<Document>>;
    fn count(&self, filters: &Filters) -> AdapterResult<u64>;

    fn insert(&self, entity: Document) -> AdapterResult<Document>;
    fn insert_many(&self, entities: Vec<Document>) -> AdapterResult<Vec<Document>>;

    fn update_many(&self, query: &Query, update: Update) -> AdapterResult<WriteSummary>;
    /// Returns the updated document, or `None` when `id` does not exist.
    fn update_by_id(&self, id: &DocId, update: Update) -> AdapterResult<Option<Document>>;

    fn remove_many(&self, query: &Query) -> AdapterResult<WriteSummary>;
    /// Acknowledges with `{"id": id}` whether or not a document was deleted.
    fn remove_by_id(&self, id: &DocId) -> AdapterResult<Document>;
    fn clear(&self) -> AdapterResult<WriteSummary>;

    /// Moves `id_field` onto the native primary key before a write.
    fn before_save_transform_id(&self, mut entity: Document, id_field: &str) -> Document {
        if id_field != ID_FIELD {
            if let Some(id) = entity.remove(id_field) {
                entity.insert(ID_FIELD.to_string(), id);
            }
        }
        entity
    }

    /// Exposes the native primary key under `id_field` after a read.
    fn after_retrieve_transform_id(&self, mut entity: Document, id_field: &str) -> Document {
        if id_field != ID_FIELD {
            if let Some(id) = entity.remove(ID_FIELD) {
                entity.insert(id_field.to_string(), id);
            }
        }
        entity
    }

    /// Converts a stored document into a plain JSON value.
    fn entity_to_object(&self, entity: &Document) -> Value {
        Value::Object(entity.clone())
    }
}
