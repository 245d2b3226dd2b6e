//! Store service schema and settings.
//!
//! The schema names the service and the database/table its adapter binds to.
//! Settings tune id mapping, field projection and pagination.

use crate::model::document::ID_FIELD;
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u64 = 10;
const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// Behavior knobs of a store service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    /// Field name under which entities expose their primary key.
    pub id_field: String,
    /// Default projection; `None` returns whole entities.
    pub fields: Option<Vec<String>>,
    pub page_size: u64,
    pub max_page_size: u64,
    /// Upper bound for `find` limits; zero or negative means unbounded.
    pub max_limit: i64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            id_field: ID_FIELD.to_string(),
            fields: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_limit: -1,
        }
    }
}

/// Declaration of a store service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSchema {
    pub name: String,
    pub database: Option<String>,
    pub table: Option<String>,
    pub settings: ServiceSettings,
}

impl ServiceSchema {
    pub fn new(
        name: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            database: Some(database.into()),
            table: Some(table.into()),
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Parses a schema from JSON; missing keys take defaults.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceSchema;

    #[test]
    fn from_json_fills_defaults() {
        let schema = ServiceSchema::from_json(
            r#"{"name": "posts", "database": "blog", "table": "posts", "settings": {"idField": "_id"}}"#,
        )
        .unwrap();

        assert_eq!(schema.database.as_deref(), Some("blog"));
        assert_eq!(schema.settings.id_field, "_id");
        assert_eq!(schema.settings.page_size, 10);
        assert_eq!(schema.settings.max_limit, -1);
        assert!(schema.settings.fields.is_none());
    }

    #[test]
    fn missing_names_stay_none() {
        let schema = ServiceSchema::from_json(r#"{"name": "posts"}"#).unwrap();
        assert!(schema.database.is_none());
        assert!(schema.table.is_none());
        assert_eq!(schema.settings.id_field, "id");
    }
}
