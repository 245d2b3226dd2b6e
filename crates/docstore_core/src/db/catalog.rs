//! Database and table catalog over one SQLite connection.
//!
//! # Responsibility
//! - List and create databases, realized as attached SQLite schemas.
//! - List and create document tables inside a database.
//!
//! # Invariants
//! - Names are validated before being spliced into SQL as quoted identifiers.
//! - `main` and `temp` are reserved by SQLite and never reported as databases.

use super::{ConnectOptions, DbError, DbResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid name regex"));

const RESERVED_SCHEMAS: &[&str] = &["main", "temp"];

/// Validates a database or table name.
///
/// `kind` is only used in the error message (`"database"` or `"table"`).
pub fn validate_name(kind: &'static str, name: &str) -> DbResult<()> {
    let reserved = kind == "database"
        && RESERVED_SCHEMAS
            .iter()
            .any(|schema| schema.eq_ignore_ascii_case(name));
    if !NAME_RE.is_match(name) || reserved {
        return Err(DbError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Returns the names of all databases attached to `conn`.
pub fn list_databases(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA database_list;")?;
    let mut rows = stmt.query([])?;
    let mut names = Vec::new();

    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        if !RESERVED_SCHEMAS.contains(&name.as_str()) {
            names.push(name);
        }
    }

    Ok(names)
}

/// Attaches `database` to `conn`, creating its backing store when absent.
pub fn create_database(conn: &Connection, database: &str, opts: &ConnectOptions) -> DbResult<()> {
    validate_name("database", database)?;
    let location = opts.database_location(database);
    conn.execute(&format!("ATTACH DATABASE ?1 AS \"{database}\";"), [&location])?;
    info!("event=db_create module=db status=ok database={database}");
    Ok(())
}

/// Returns the table names of `database`, sorted by name.
pub fn list_tables(conn: &Connection, database: &str) -> DbResult<Vec<String>> {
    validate_name("database", database)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT name FROM \"{database}\".sqlite_master
         WHERE type = 'table'
         ORDER BY name ASC;"
    ))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Creates the document table `table` inside `database`.
pub fn create_table(conn: &Connection, database: &str, table: &str) -> DbResult<()> {
    validate_name("database", database)?;
    validate_name("table", table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE \"{database}\".\"{table}\" (
            id TEXT PRIMARY KEY NOT NULL,
            doc TEXT NOT NULL
        );"
    ))?;
    info!("event=table_create module=db status=ok database={database} table={table}");
    Ok(())
}
