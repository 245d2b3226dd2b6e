//! Generic store service driving a [`StoreAdapter`].
//!
//! # Responsibility
//! - Expose entity actions (`find`, `list`, `get`, `create`, `update`, ...)
//!   over whichever adapter the service is built with.
//! - Map ids between the public `id_field` and the adapter's primary key.
//! - Apply field projection and pagination settings.
//!
//! # Invariants
//! - Every returned entity passes through `after_retrieve_transform_id`,
//!   `entity_to_object` and then the field projection, in that order.
//! - `update` never rewrites the primary key.
//! - `count` ignores `limit`/`offset`.

use crate::adapter::{AdapterError, StoreAdapter, WriteSummary};
use crate::model::document::{DocId, Document, FieldPath, ID_FIELD};
use crate::model::filter::{Filters, Sort};
use crate::model::query::{Predicate, Query};
use crate::model::update::Update;
use crate::service::schema::{ServiceSchema, ServiceSettings};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const SET_ENVELOPE: &str = "$set";

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for store actions.
#[derive(Debug)]
pub enum ServiceError {
    /// Adapter-level failure.
    Adapter(AdapterError),
    /// No entity has the requested id.
    EntityNotFound(DocId),
    /// Request parameters cannot be interpreted.
    InvalidParams(String),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adapter(err) => write!(f, "{err}"),
            Self::EntityNotFound(id) => write!(f, "entity not found: {id}"),
            Self::InvalidParams(message) => write!(f, "invalid params: {message}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Adapter(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AdapterError> for ServiceError {
    fn from(value: AdapterError) -> Self {
        Self::Adapter(value)
    }
}

/// Parameters of `find` and `count`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindParams {
    #[serde(flatten)]
    pub filters: Filters,
    /// Projection overriding the settings' `fields`.
    pub fields: Option<Vec<String>>,
}

impl FindParams {
    pub fn new(filters: Filters) -> Self {
        Self {
            filters,
            fields: None,
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Parameters of `list`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListParams {
    /// 1-based page; missing or zero means the first page.
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub query: Option<Query>,
    pub sort: Option<Sort>,
    pub search: Option<String>,
    pub search_fields: Vec<String>,
    pub fields: Option<Vec<String>>,
}

/// One page of `list` results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub rows: Vec<Value>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// Entity actions over one adapter-backed table.
pub struct StoreService<A: StoreAdapter> {
    schema: ServiceSchema,
    adapter: A,
}

impl<A: StoreAdapter> StoreService<A> {
    pub fn new(schema: ServiceSchema, adapter: A) -> Self {
        Self { schema, adapter }
    }

    pub fn schema(&self) -> &ServiceSchema {
        &self.schema
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.schema.settings
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Binds the adapter to the schema and connects it.
    pub fn start(&mut self) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result = self
            .adapter
            .init(&self.schema)
            .and_then(|()| self.adapter.connect());

        match &result {
            Ok(()) => info!(
                "event=service_start module=service status=ok service={} duration_ms={}",
                self.schema.name,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=service_start module=service status=error service={} duration_ms={} error={}",
                self.schema.name,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result.map_err(Into::into)
    }

    pub fn stop(&mut self) -> ServiceResult<()> {
        self.adapter.disconnect()?;
        info!(
            "event=service_stop module=service status=ok service={}",
            self.schema.name
        );
        Ok(())
    }

    /// Finds entities matching `params`.
    pub fn find(&self, params: &FindParams) -> ServiceResult<Vec<Value>> {
        let mut filters = self.prepare_filters(params.filters.clone());
        let max_limit = self.settings().max_limit;
        if max_limit > 0 {
            let max_limit = max_limit as u64;
            filters.limit = filters.limit.map(|limit| limit.min(max_limit));
        }

        let docs = self.adapter.find(&filters)?;
        self.transform_all(docs, params.fields.as_deref())
    }

    /// Counts entities matching `params`, ignoring pagination.
    pub fn count(&self, params: &FindParams) -> ServiceResult<u64> {
        let mut filters = self.prepare_filters(params.filters.clone());
        filters.limit = None;
        filters.offset = None;
        Ok(self.adapter.count(&filters)?)
    }

    /// Returns one page of entities plus totals.
    pub fn list(&self, params: &ListParams) -> ServiceResult<ListPage> {
        let settings = self.settings();
        let page = params.page.filter(|page| *page > 0).unwrap_or(1);
        let mut page_size = params
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(settings.page_size)
            .max(1);
        if settings.max_page_size > 0 {
            page_size = page_size.min(settings.max_page_size);
        }

        let filters = self.prepare_filters(Filters {
            query: params.query.clone(),
            sort: params.sort.clone(),
            limit: None,
            offset: None,
            search: params.search.clone(),
            search_fields: params.search_fields.clone(),
        });
        let total = self.adapter.count(&filters)?;
        let page_filters = filters
            .limit(page_size)
            .offset((page - 1).saturating_mul(page_size));
        let docs = self.adapter.find(&page_filters)?;

        Ok(ListPage {
            rows: self.transform_all(docs, params.fields.as_deref())?,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    /// Creates one entity; a missing id is generated by the adapter.
    pub fn create(&self, entity: Document) -> ServiceResult<Value> {
        let entity = self.adapter.before_save_transform_id(entity, &self.settings().id_field);
        let saved = self.adapter.insert(entity)?;
        self.transform(saved, None)
    }

    /// Creates several entities atomically.
    pub fn insert(&self, entities: Vec<Document>) -> ServiceResult<Vec<Value>> {
        let id_field = &self.settings().id_field;
        let entities = entities
            .into_iter()
            .map(|entity| self.adapter.before_save_transform_id(entity, id_field))
            .collect();
        let saved = self.adapter.insert_many(entities)?;
        self.transform_all(saved, None)
    }

    pub fn get(&self, id: &DocId) -> ServiceResult<Value> {
        let doc = self
            .adapter
            .find_by_id(id)?
            .ok_or_else(|| ServiceError::EntityNotFound(id.clone()))?;
        self.transform(doc, None)
    }

    /// Found entities in request order; unknown ids are skipped.
    pub fn get_many(&self, ids: &[DocId]) -> ServiceResult<Vec<Value>> {
        let docs = self.adapter.find_by_ids(ids)?;
        self.transform_all(docs, None)
    }

    /// Applies `changes` to the entity `id`.
    ///
    /// Changes are wrapped in a `$set` envelope; an `$inc` key is passed
    /// through as increments and must hold an object. The id field is
    /// dropped from `changes`.
    pub fn update(&self, id: &DocId, mut changes: Document) -> ServiceResult<Value> {
        changes.remove(&self.settings().id_field);
        changes.remove(ID_FIELD);

        let mut payload = Document::new();
        let increments = changes.remove("$inc");
        payload.insert(SET_ENVELOPE.to_string(), Value::Object(changes));
        if let Some(increments) = increments {
            payload.insert("$inc".to_string(), increments);
        }

        let update = Update::try_from(payload)
            .map_err(|err| ServiceError::InvalidParams(err.to_string()))?;
        let doc = self
            .adapter
            .update_by_id(id, update)?
            .ok_or_else(|| ServiceError::EntityNotFound(id.clone()))?;
        self.transform(doc, None)
    }

    /// Removes the entity `id`; the acknowledgement carries only the id.
    pub fn remove(&self, id: &DocId) -> ServiceResult<Value> {
        let ack = self.adapter.remove_by_id(id)?;
        self.transform(ack, None)
    }

    /// Removes every entity of the table.
    pub fn clear(&self) -> ServiceResult<WriteSummary> {
        Ok(self.adapter.clear()?)
    }

    /// Rewrites every reference to `id_field` (query, sort, search fields)
    /// onto the primary key.
    fn prepare_filters(&self, mut filters: Filters) -> Filters {
        let id_field = self.settings().id_field.as_str();
        if id_field == ID_FIELD {
            return filters;
        }

        match filters.query.as_mut() {
            Some(Query::Match(query)) => {
                if let Some(id) = query.remove(id_field) {
                    query.insert(ID_FIELD.to_string(), id);
                }
            }
            Some(Query::Expr(predicate)) => rename_predicate_field(predicate, id_field),
            None => {}
        }
        if let Some(sort) = filters.sort.as_mut() {
            rename_field(&mut sort.key, id_field);
        }
        for field in &mut filters.search_fields {
            rename_field(field, id_field);
        }
        filters
    }

    fn transform_all(
        &self,
        docs: Vec<Document>,
        fields: Option<&[String]>,
    ) -> ServiceResult<Vec<Value>> {
        docs.into_iter().map(|doc| self.transform(doc, fields)).collect()
    }

    fn transform(&self, doc: Document, fields: Option<&[String]>) -> ServiceResult<Value> {
        let doc = self
            .adapter
            .after_retrieve_transform_id(doc, &self.settings().id_field);
        let value = self.adapter.entity_to_object(&doc);

        match fields.or(self.settings().fields.as_deref()) {
            Some(fields) => project(value, fields),
            None => Ok(value),
        }
    }
}

fn rename_predicate_field(predicate: &mut Predicate, id_field: &str) {
    match predicate {
        Predicate::Compare { field, .. } | Predicate::HasField(field) => {
            rename_field(field, id_field)
        }
        Predicate::And(children) | Predicate::Or(children) => {
            for child in children {
                rename_predicate_field(child, id_field);
            }
        }
        Predicate::Not(inner) => rename_predicate_field(inner, id_field),
    }
}

fn rename_field(field: &mut String, id_field: &str) {
    if *field == id_field {
        *field = ID_FIELD.to_string();
    }
}

/// Keeps only `fields` (dotted paths allowed) of an object value.
fn project(value: Value, fields: &[String]) -> ServiceResult<Value> {
    let Value::Object(source) = value else {
        return Ok(value);
    };

    let mut projected = Map::new();
    for field in fields {
        let path = FieldPath::parse(field)
            .map_err(|err| ServiceError::InvalidParams(err.to_string()))?;
        if let Some(found) = path.lookup(&source) {
            path.assign(&mut projected, found.clone());
        }
    }
    Ok(Value::Object(projected))
}
