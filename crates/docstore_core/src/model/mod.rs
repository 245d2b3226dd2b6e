//! Document model and the framework-level query vocabulary.
//!
//! # Responsibility
//! - Define the schema-free record shape shared by adapter and service.
//! - Define filters, predicates and partial updates independent of storage.
//!
//! # Invariants
//! - Nothing in this module touches SQL; compilation lives in `adapter`.

pub mod document;
pub mod filter;
pub mod query;
pub mod update;
