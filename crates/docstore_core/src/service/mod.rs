//! Store service layer.
//!
//! # Responsibility
//! - Declare services (`schema`) and run entity actions over an adapter
//!   (`store_service`).
//! - Keep callers decoupled from storage details.

pub mod schema;
pub mod store_service;
