//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open the adapter's single SQLite connection.
//! - Configure pragmas required by document storage.
//!
//! # Invariants
//! - File-backed options create `data_dir` before any database is attached.

use super::{ConnectOptions, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

/// Opens the adapter connection described by `opts`.
///
/// The `main` schema is always in memory; databases are attached on demand
/// through [`super::create_database`].
///
/// # Side effects
/// - Creates `opts.data_dir` when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_connection(opts: &ConnectOptions) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = if opts.data_dir.is_some() {
        "file"
    } else {
        "memory"
    };
    info!("event=db_open module=db status=start mode={mode}");

    if let Some(dir) = &opts.data_dir {
        if let Err(err) = std::fs::create_dir_all(dir) {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=data_dir_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    }

    let conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match conn.busy_timeout(Duration::from_millis(opts.busy_timeout_ms)) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}
