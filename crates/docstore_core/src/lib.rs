//! Document-store adapter core.
//!
//! A generic [`StoreService`] drives any [`StoreAdapter`]; the bundled
//! [`SqliteDocumentAdapter`] keeps schema-free JSON documents in SQLite.

pub mod adapter;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;

pub use adapter::{
    AdapterError, AdapterResult, SqliteDocumentAdapter, StoreAdapter, WriteSummary,
};
pub use db::{ConnectOptions, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::document::{doc_id, DocId, Document, FieldPath, FieldPathError, ID_FIELD};
pub use model::filter::{Filters, Sort, SortDir};
pub use model::query::{row, CmpOp, Predicate, Query, Row};
pub use model::update::{Update, UpdateError, UpdateField, UpdateOp};
pub use service::schema::{ServiceSchema, ServiceSettings};
pub use service::store_service::{
    FindParams, ListPage, ListParams, ServiceError, ServiceResult, StoreService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
