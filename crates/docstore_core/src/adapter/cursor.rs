//! Query compilation: filters and predicates to SQL over JSON documents.
//!
//! # Responsibility
//! - Compile `Query` values into `WHERE` fragments with bound parameters.
//! - Build the find/count cursor: filter, search, order, skip, limit.
//!
//! # Invariants
//! - User values and JSON paths are always bound, never spliced into SQL.
//! - Comparisons are type-exact: a field only matches values of its own JSON
//!   kind, and a missing field never matches (not even under `NOT`).
//! - Without a sort, rows come back in insertion order.

use super::{AdapterError, AdapterResult};
use crate::model::document::{Document, FieldPath};
use crate::model::filter::Filters;
use crate::model::query::{CmpOp, Predicate, Query};
use rusqlite::types::Value as SqlValue;
use serde_json::{Number, Value};

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub binds: Vec<SqlValue>,
}

impl SqlFragment {
    fn new(sql: impl Into<String>, binds: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }

    fn always() -> Self {
        Self::new("1 = 1", Vec::new())
    }

    fn never() -> Self {
        Self::new("1 = 0", Vec::new())
    }

    fn join(parts: Vec<SqlFragment>, separator: &str) -> Self {
        if parts.len() == 1 {
            return parts.into_iter().next().unwrap_or_else(Self::always);
        }
        let mut sql = Vec::with_capacity(parts.len());
        let mut binds = Vec::new();
        for part in parts {
            sql.push(format!("({})", part.sql));
            binds.extend(part.binds);
        }
        Self::new(sql.join(separator), binds)
    }
}

/// Executable find or count statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub sql: String,
    pub binds: Vec<SqlValue>,
    pub counting: bool,
}

/// Builds the statement for `find` (`counting = false`) or `count`.
///
/// `table` must already be a quoted, qualified table name. Counting stops
/// after filtering, so sort and pagination never affect a count.
pub fn create_cursor(
    table: &str,
    filters: Option<&Filters>,
    counting: bool,
) -> AdapterResult<Cursor> {
    let mut sql = if counting {
        format!("SELECT COUNT(*) FROM {table}")
    } else {
        format!("SELECT id, doc FROM {table}")
    };
    let mut binds = Vec::new();

    let Some(filters) = filters else {
        if !counting {
            sql.push_str(" ORDER BY rowid ASC");
        }
        return Ok(Cursor {
            sql,
            binds,
            counting,
        });
    };

    let mut conditions = Vec::new();
    if let Some(query) = &filters.query {
        conditions.push(compile_query(query)?);
    }
    if let Some(text) = filters.effective_search() {
        conditions.push(compile_search(text, &filters.search_fields)?);
    }
    if !conditions.is_empty() {
        let condition = SqlFragment::join(conditions, " AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&condition.sql);
        binds.extend(condition.binds);
    }

    if counting {
        return Ok(Cursor {
            sql,
            binds,
            counting,
        });
    }

    match &filters.sort {
        Some(sort) => {
            let path = FieldPath::parse(&sort.key)?;
            sql.push_str(&format!(
                " ORDER BY json_extract(doc, ?) {}, rowid ASC",
                sort.dir.as_sql()
            ));
            binds.push(SqlValue::Text(path.json_path()));
        }
        None => sql.push_str(" ORDER BY rowid ASC"),
    }

    let offset = filters.effective_offset();
    if let Some(limit) = filters.effective_limit() {
        sql.push_str(" LIMIT ?");
        binds.push(SqlValue::Integer(clamp_i64(limit)));
        if let Some(offset) = offset {
            sql.push_str(" OFFSET ?");
            binds.push(SqlValue::Integer(clamp_i64(offset)));
        }
    } else if let Some(offset) = offset {
        sql.push_str(" LIMIT -1 OFFSET ?");
        binds.push(SqlValue::Integer(clamp_i64(offset)));
    }

    Ok(Cursor {
        sql,
        binds,
        counting,
    })
}

/// Compiles a query into a `WHERE` fragment over the `doc` column.
pub fn compile_query(query: &Query) -> AdapterResult<SqlFragment> {
    match query {
        Query::Match(fields) => compile_match(fields),
        Query::Expr(predicate) => compile_predicate(predicate),
    }
}

fn compile_match(fields: &Document) -> AdapterResult<SqlFragment> {
    if fields.is_empty() {
        return Ok(SqlFragment::always());
    }
    let mut parts = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        match_field(&FieldPath::key(key)?, value, &mut parts)?;
    }
    Ok(SqlFragment::join(parts, " AND "))
}

fn match_field(path: &FieldPath, value: &Value, parts: &mut Vec<SqlFragment>) -> AdapterResult<()> {
    match value {
        Value::Object(nested) if nested.is_empty() => parts.push(SqlFragment::new(
            "json_type(doc, ?) = 'object'",
            vec![SqlValue::Text(path.json_path())],
        )),
        Value::Object(nested) => {
            for (key, value) in nested {
                match_field(&path.child(key)?, value, parts)?;
            }
        }
        other => parts.push(equality(path, other)),
    }
    Ok(())
}

fn compile_predicate(predicate: &Predicate) -> AdapterResult<SqlFragment> {
    match predicate {
        Predicate::Compare { field, op, value } => {
            let path = FieldPath::parse(field)?;
            match op {
                CmpOp::Eq => Ok(equality(&path, value)),
                CmpOp::Ne => {
                    let eq = equality(&path, value);
                    let mut binds = vec![SqlValue::Text(path.json_path())];
                    binds.extend(eq.binds);
                    Ok(SqlFragment::new(
                        format!("json_type(doc, ?) IS NOT NULL AND NOT ({})", eq.sql),
                        binds,
                    ))
                }
                ordering => ordered_comparison(&path, *ordering, value),
            }
        }
        Predicate::HasField(field) => {
            let path = FieldPath::parse(field)?;
            Ok(SqlFragment::new(
                "json_type(doc, ?) IS NOT NULL",
                vec![SqlValue::Text(path.json_path())],
            ))
        }
        Predicate::And(items) if items.is_empty() => Ok(SqlFragment::always()),
        Predicate::Or(items) if items.is_empty() => Ok(SqlFragment::never()),
        Predicate::And(items) => Ok(SqlFragment::join(compile_all(items)?, " AND ")),
        Predicate::Or(items) => Ok(SqlFragment::join(compile_all(items)?, " OR ")),
        Predicate::Not(inner) => {
            let inner = compile_predicate(inner)?;
            Ok(SqlFragment::new(format!("NOT ({})", inner.sql), inner.binds))
        }
    }
}

fn compile_all(items: &[Predicate]) -> AdapterResult<Vec<SqlFragment>> {
    items.iter().map(compile_predicate).collect()
}

fn equality(path: &FieldPath, value: &Value) -> SqlFragment {
    let json_path = SqlValue::Text(path.json_path());
    match value {
        Value::Null => SqlFragment::new("json_type(doc, ?) = 'null'", vec![json_path]),
        Value::Bool(true) => SqlFragment::new("json_type(doc, ?) = 'true'", vec![json_path]),
        Value::Bool(false) => SqlFragment::new("json_type(doc, ?) = 'false'", vec![json_path]),
        Value::Number(number) => SqlFragment::new(
            "json_type(doc, ?) IN ('integer', 'real') AND json_extract(doc, ?) = ?",
            vec![json_path.clone(), json_path, number_value(number)],
        ),
        Value::String(text) => SqlFragment::new(
            "json_type(doc, ?) = 'text' AND json_extract(doc, ?) = ?",
            vec![json_path.clone(), json_path, SqlValue::Text(text.clone())],
        ),
        Value::Array(_) => SqlFragment::new(
            "json_type(doc, ?) = 'array' AND json_extract(doc, ?) = json(?)",
            vec![json_path.clone(), json_path, SqlValue::Text(value.to_string())],
        ),
        Value::Object(_) => SqlFragment::new(
            "json_type(doc, ?) = 'object' AND json_extract(doc, ?) = json(?)",
            vec![json_path.clone(), json_path, SqlValue::Text(value.to_string())],
        ),
    }
}

fn ordered_comparison(path: &FieldPath, op: CmpOp, value: &Value) -> AdapterResult<SqlFragment> {
    let json_path = SqlValue::Text(path.json_path());
    let (kinds, bound) = match value {
        Value::Number(number) => ("'integer', 'real'", number_value(number)),
        Value::String(text) => ("'text'", SqlValue::Text(text.clone())),
        Value::Bool(flag) => ("'true', 'false'", SqlValue::Integer(i64::from(*flag))),
        other => {
            return Err(AdapterError::InvalidQuery(format!(
                "cannot compare `{path}` with {other} using `{}`",
                op.as_sql()
            )))
        }
    };
    Ok(SqlFragment::new(
        format!(
            "json_type(doc, ?) IN ({kinds}) AND json_extract(doc, ?) {} ?",
            op.as_sql()
        ),
        vec![json_path.clone(), json_path, bound],
    ))
}

fn compile_search(text: &str, fields: &[String]) -> AdapterResult<SqlFragment> {
    let pattern = SqlValue::Text(format!("%{}%", escape_like(text)));

    if fields.is_empty() {
        return Ok(SqlFragment::new(
            "EXISTS (SELECT 1 FROM json_tree(doc) WHERE json_tree.type = 'text' AND json_tree.value LIKE ? ESCAPE '\\')",
            vec![pattern],
        ));
    }

    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        let json_path = SqlValue::Text(FieldPath::parse(field)?.json_path());
        parts.push(SqlFragment::new(
            "json_type(doc, ?) = 'text' AND json_extract(doc, ?) LIKE ? ESCAPE '\\'",
            vec![json_path.clone(), json_path, pattern.clone()],
        ));
    }
    Ok(SqlFragment::join(parts, " OR "))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn number_value(number: &Number) -> SqlValue {
    number
        .as_i64()
        .map(SqlValue::Integer)
        .or_else(|| number.as_f64().map(SqlValue::Real))
        .unwrap_or(SqlValue::Null)
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
