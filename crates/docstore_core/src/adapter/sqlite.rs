//! SQLite-backed document adapter.
//!
//! # Responsibility
//! - Own the single connection and the bound database/table.
//! - Forward each adapter operation to one statement (or one transaction for
//!   multi-document writes) and shape the rows into documents.
//!
//! # Invariants
//! - Keys are stored as canonical JSON text: `5` and `"5"` are distinct keys,
//!   `5` and `5.0` are the same key.
//! - Inserts and updates re-read what they wrote before returning it.
//! - Multi-document writes commit atomically or not at all.

use super::cursor::{compile_query, create_cursor, Cursor};
use super::{AdapterError, AdapterResult, StoreAdapter, WriteSummary};
use crate::db::{
    create_database, create_table, list_databases, list_tables, open_connection, validate_name,
    ConnectOptions,
};
use crate::model::document::{doc_id, DocId, Document, ID_FIELD};
use crate::model::filter::Filters;
use crate::model::query::Query;
use crate::model::update::Update;
use crate::service::schema::ServiceSchema;
use log::{debug, error, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

// Largest integer an f64 holds exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone)]
struct Target {
    database: String,
    table: String,
    qualified: String,
}

impl Target {
    fn new(database: &str, table: &str) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            qualified: format!("\"{database}\".\"{table}\""),
        }
    }
}

/// Document adapter storing each table as `(id, doc)` rows of JSON text.
pub struct SqliteDocumentAdapter {
    opts: ConnectOptions,
    target: Option<Target>,
    conn: Option<Connection>,
}

impl SqliteDocumentAdapter {
    pub fn new(opts: ConnectOptions) -> Self {
        Self {
            opts,
            target: None,
            conn: None,
        }
    }

    /// Adapter whose databases live in memory for the connection lifetime.
    pub fn in_memory() -> Self {
        Self::new(ConnectOptions::in_memory())
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.opts
    }

    pub fn database(&self) -> Option<&str> {
        self.target.as_ref().map(|target| target.database.as_str())
    }

    pub fn table(&self) -> Option<&str> {
        self.target.as_ref().map(|target| target.table.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Live connection, for callers that need native access.
    pub fn client(&self) -> AdapterResult<&Connection> {
        self.conn.as_ref().ok_or(AdapterError::NotConnected)
    }

    /// Builds the find (`counting = false`) or count statement for `filters`.
    pub fn create_cursor(
        &self,
        filters: Option<&Filters>,
        counting: bool,
    ) -> AdapterResult<Cursor> {
        let target = self.target.as_ref().ok_or(AdapterError::NotInitialized)?;
        create_cursor(&target.qualified, filters, counting)
    }

    fn session(&self) -> AdapterResult<(&Connection, &Target)> {
        let conn = self.conn.as_ref().ok_or(AdapterError::NotConnected)?;
        let target = self.target.as_ref().ok_or(AdapterError::NotInitialized)?;
        Ok((conn, target))
    }

    fn insert_documents(&self, entities: Vec<Document>) -> AdapterResult<Vec<String>> {
        let (conn, target) = self.session()?;
        let tx = conn.unchecked_transaction()?;
        let mut keys = Vec::with_capacity(entities.len());
        let mut summary = WriteSummary::default();

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, doc) VALUES (?1, ?2);",
                target.qualified
            ))?;
            for mut entity in entities {
                let id = match doc_id(&entity) {
                    Some(id) => id.clone(),
                    None => {
                        let generated = Value::String(Uuid::new_v4().to_string());
                        entity.insert(ID_FIELD.to_string(), generated.clone());
                        summary.generated_keys.push(generated.clone());
                        generated
                    }
                };
                let key = encode_key(&id)?;
                let text = serde_json::to_string(&entity)?;
                stmt.execute(params![key, text])
                    .map_err(|err| map_insert_error(err, &id))?;
                summary.inserted += 1;
                keys.push(key);
            }
        }

        tx.commit()?;
        debug!(
            "event=insert module=adapter status=ok table={} inserted={} generated={}",
            target.table,
            summary.inserted,
            summary.generated_keys.len()
        );
        Ok(keys)
    }
}

impl StoreAdapter for SqliteDocumentAdapter {
    fn init(&mut self, schema: &ServiceSchema) -> AdapterResult<()> {
        let database = non_blank(schema.database.as_deref()).ok_or(AdapterError::MissingDatabase)?;
        let table = non_blank(schema.table.as_deref()).ok_or(AdapterError::MissingTable)?;
        validate_name("database", database)?;
        validate_name("table", table)?;

        self.target = Some(Target::new(database, table));
        info!(
            "event=adapter_init module=adapter status=ok service={} database={database} table={table}",
            schema.name
        );
        Ok(())
    }

    fn connect(&mut self) -> AdapterResult<()> {
        let target = self.target.as_ref().ok_or(AdapterError::NotInitialized)?;
        if self.conn.is_some() {
            debug!(
                "event=adapter_connect module=adapter status=ok database={} reused=true",
                target.database
            );
            return Ok(());
        }

        let started_at = Instant::now();
        let conn = open_connection(&self.opts)?;
        match ensure_target(&conn, target, &self.opts) {
            Ok(()) => {
                info!(
                    "event=adapter_connect module=adapter status=ok database={} table={} duration_ms={}",
                    target.database,
                    target.table,
                    started_at.elapsed().as_millis()
                );
                self.conn = Some(conn);
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=adapter_connect module=adapter status=error database={} table={} duration_ms={} error={}",
                    target.database,
                    target.table,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn disconnect(&mut self) -> AdapterResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, err)| AdapterError::from(err))?;
        info!("event=adapter_disconnect module=adapter status=ok");
        Ok(())
    }

    fn find(&self, filters: &Filters) -> AdapterResult<Vec<Document>> {
        let (conn, target) = self.session()?;
        let cursor = create_cursor(&target.qualified, Some(filters), false)?;
        fetch_documents(conn, &cursor.sql, cursor.binds)
    }

    fn find_one(&self, query: &Query) -> AdapterResult<Option<Document>> {
        let filters = Filters::new().query(query.clone()).limit(1);
        Ok(self.find(&filters)?.into_iter().next())
    }

    fn find_by_id(&self, id: &DocId) -> AdapterResult<Option<Document>> {
        let (conn, target) = self.session()?;
        load_by_key(conn, &target.qualified, &encode_key(id)?)
    }

    fn find_by_ids(&self, ids: &[DocId]) -> AdapterResult<Vec<Document>> {
        let (conn, target) = self.session()?;
        let keys = ids.iter().map(encode_key).collect::<AdapterResult<Vec<_>>>()?;
        load_by_keys(conn, &target.qualified, &keys)
    }

    fn count(&self, filters: &Filters) -> AdapterResult<u64> {
        let (conn, target) = self.session()?;
        let cursor = create_cursor(&target.qualified, Some(filters), true)?;
        let count: i64 =
            conn.query_row(&cursor.sql, params_from_iter(cursor.binds), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn insert(&self, entity: Document) -> AdapterResult<Document> {
        let keys = self.insert_documents(vec![entity])?;
        let (conn, target) = self.session()?;
        let key = keys
            .first()
            .ok_or_else(|| AdapterError::InvalidData("insert reported no key".to_string()))?;
        load_by_key(conn, &target.qualified, key)?.ok_or_else(|| {
            AdapterError::InvalidData(format!("inserted document {key} could not be re-read"))
        })
    }

    fn insert_many(&self, entities: Vec<Document>) -> AdapterResult<Vec<Document>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let keys = self.insert_documents(entities)?;
        let (conn, target) = self.session()?;
        load_by_keys(conn, &target.qualified, &keys)
    }

    fn update_many(&self, query: &Query, update: Update) -> AdapterResult<WriteSummary> {
        let (conn, target) = self.session()?;
        let condition = compile_query(query)?;
        let tx = conn.unchecked_transaction()?;
        let rows = fetch_rows(
            &tx,
            &format!(
                "SELECT id, doc FROM {} WHERE {} ORDER BY rowid ASC",
                target.qualified, condition.sql
            ),
            condition.binds,
        )?;

        let mut summary = WriteSummary::default();
        for (key, current) in rows {
            match update.apply(&current) {
                Err(err) => summary.record_error(err.to_string()),
                Ok(next) if next == current => summary.unchanged += 1,
                Ok(next) => {
                    store_document(&tx, &target.qualified, &key, &next)?;
                    summary.replaced += 1;
                }
            }
        }
        tx.commit()?;

        debug!(
            "event=update_many module=adapter status=ok table={} replaced={} unchanged={} errors={}",
            target.table, summary.replaced, summary.unchanged, summary.errors
        );
        Ok(summary)
    }

    fn update_by_id(&self, id: &DocId, update: Update) -> AdapterResult<Option<Document>> {
        let (conn, target) = self.session()?;
        let key = encode_key(id)?;
        let tx = conn.unchecked_transaction()?;

        let Some(current) = load_by_key(&tx, &target.qualified, &key)? else {
            debug!(
                "event=update_by_id module=adapter status=ok table={} skipped=1",
                target.table
            );
            return Ok(None);
        };
        let next = update
            .apply(&current)
            .map_err(|err| AdapterError::Write(err.to_string()))?;
        if next != current {
            store_document(&tx, &target.qualified, &key, &next)?;
        }
        tx.commit()?;

        load_by_key(conn, &target.qualified, &key)
    }

    fn remove_many(&self, query: &Query) -> AdapterResult<WriteSummary> {
        let (conn, target) = self.session()?;
        let condition = compile_query(query)?;
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE {};", target.qualified, condition.sql),
            params_from_iter(condition.binds),
        )?;
        debug!(
            "event=remove_many module=adapter status=ok table={} deleted={deleted}",
            target.table
        );
        Ok(WriteSummary {
            deleted: deleted as u64,
            ..WriteSummary::default()
        })
    }

    fn remove_by_id(&self, id: &DocId) -> AdapterResult<Document> {
        let (conn, target) = self.session()?;
        let key = encode_key(id)?;
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", target.qualified),
            [&key],
        )?;

        let mut ack = Document::new();
        ack.insert(ID_FIELD.to_string(), id.clone());
        Ok(ack)
    }

    fn clear(&self) -> AdapterResult<WriteSummary> {
        let (conn, target) = self.session()?;
        let deleted = conn.execute(&format!("DELETE FROM {};", target.qualified), [])?;
        info!(
            "event=clear module=adapter status=ok table={} deleted={deleted}",
            target.table
        );
        Ok(WriteSummary {
            deleted: deleted as u64,
            ..WriteSummary::default()
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn ensure_target(conn: &Connection, target: &Target, opts: &ConnectOptions) -> AdapterResult<()> {
    if !list_databases(conn)?.contains(&target.database) {
        create_database(conn, &target.database, opts)?;
    }
    if !list_tables(conn, &target.database)?.contains(&target.table) {
        create_table(conn, &target.database, &target.table)?;
    }
    Ok(())
}

/// Canonical key text for `id`.
fn encode_key(id: &DocId) -> AdapterResult<String> {
    match id {
        Value::String(_) => Ok(id.to_string()),
        Value::Number(number) => Ok(canonical_number(number).to_string()),
        other => Err(AdapterError::InvalidKey(other.clone())),
    }
}

fn canonical_number(number: &Number) -> Number {
    if let Some(value) = number.as_f64().filter(|_| number.is_f64()) {
        if value.fract() == 0.0 && value.abs() < MAX_EXACT_FLOAT_INT {
            return Number::from(value as i64);
        }
    }
    number.clone()
}

fn map_insert_error(err: rusqlite::Error, id: &DocId) -> AdapterError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            return AdapterError::Write(format!("duplicate primary key `{ID_FIELD}`: {id}"));
        }
    }
    err.into()
}

fn decode_document(key: &str, text: &str) -> AdapterResult<Document> {
    serde_json::from_str(text)
        .map_err(|err| AdapterError::InvalidData(format!("document {key} is not an object: {err}")))
}

fn fetch_rows(
    conn: &Connection,
    sql: &str,
    binds: Vec<SqlValue>,
) -> AdapterResult<Vec<(String, Document)>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut documents = Vec::new();

    while let Some(row) = rows.next()? {
        let key: String = row.get("id")?;
        let text: String = row.get("doc")?;
        let document = decode_document(&key, &text)?;
        documents.push((key, document));
    }

    Ok(documents)
}

fn fetch_documents(
    conn: &Connection,
    sql: &str,
    binds: Vec<SqlValue>,
) -> AdapterResult<Vec<Document>> {
    Ok(fetch_rows(conn, sql, binds)?
        .into_iter()
        .map(|(_, document)| document)
        .collect())
}

fn load_by_key(conn: &Connection, table: &str, key: &str) -> AdapterResult<Option<Document>> {
    let rows = fetch_rows(
        conn,
        &format!("SELECT id, doc FROM {table} WHERE id = ?1;"),
        vec![SqlValue::Text(key.to_string())],
    )?;
    Ok(rows.into_iter().next().map(|(_, document)| document))
}

fn load_by_keys(conn: &Connection, table: &str, keys: &[String]) -> AdapterResult<Vec<Document>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let rows = fetch_rows(
        conn,
        &format!("SELECT id, doc FROM {table} WHERE id IN (SELECT value FROM json_each(?1));"),
        vec![SqlValue::Text(serde_json::to_string(keys)?)],
    )?;
    let mut by_key: HashMap<String, Document> = rows.into_iter().collect();

    Ok(keys.iter().filter_map(|key| by_key.remove(key)).collect())
}

fn store_document(
    conn: &Connection,
    table: &str,
    key: &str,
    document: &Document,
) -> AdapterResult<()> {
    conn.execute(
        &format!("UPDATE {table} SET doc = ?2 WHERE id = ?1;"),
        params![key, serde_json::to_string(document)?],
    )?;
    Ok(())
}
