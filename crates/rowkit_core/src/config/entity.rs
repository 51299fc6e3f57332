//! Declarative entity definitions and the catalog that owns them.
//!
//! # Responsibility
//! - Describe tables, primary keys, field sets and relation keys as data.
//! - Build shared, validated descriptors once at startup.
//!
//! # Invariants
//! - Record kinds and table names are unique within one catalog.
//! - Every descriptor handed out has passed schema and table validation.

use crate::error::ConfigError;
use crate::model::record::{Attributes, RecordSchema};
use crate::repo::composite_repo::CompositeConfig;
use crate::repo::table_repo::TableConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Foreign-key pair of a join table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationKeys {
    pub from: String,
    pub to: String,
}

/// One entity as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Record kind name; also the catalog lookup key.
    pub record: String,
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub defaults: Attributes,
    /// Present for join tables only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationKeys>,
}

impl EntityDefinition {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Malformed(err.to_string()))
    }

    pub fn record_schema(&self) -> Result<RecordSchema, ConfigError> {
        RecordSchema::builder(self.record.as_str())
            .fields(self.fields.iter().cloned())
            .required(self.required.iter().cloned())
            .defaults(self.defaults.clone())
            .build()
    }

    pub fn table_config(&self) -> Result<TableConfig, ConfigError> {
        TableConfig::new(
            self.table.as_str(),
            self.primary_key.as_str(),
            Arc::new(self.record_schema()?),
        )
    }

    /// # Errors
    /// - `MissingRelation` when the definition declares no relation keys.
    pub fn composite_config(&self) -> Result<CompositeConfig, ConfigError> {
        let keys = self
            .relation
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRelation {
                record: self.record.clone(),
            })?;
        CompositeConfig::new(self.table_config()?, keys.from.as_str(), keys.to.as_str())
    }
}

#[derive(Debug, Clone)]
enum CatalogEntry {
    Table(Arc<TableConfig>),
    Composite(Arc<CompositeConfig>),
}

/// Validated set of entity descriptors, keyed by record kind.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl EntityCatalog {
    /// Builds a catalog from definitions.
    ///
    /// # Errors
    /// - `DuplicateEntity` when two definitions share a record kind or table.
    /// - Any schema, table or relation validation error.
    pub fn from_definitions(definitions: Vec<EntityDefinition>) -> Result<Self, ConfigError> {
        let mut entries = BTreeMap::new();
        let mut tables = BTreeSet::new();

        for definition in definitions {
            if !tables.insert(definition.table.clone()) {
                return Err(ConfigError::DuplicateEntity(definition.table));
            }
            let entry = if definition.relation.is_some() {
                CatalogEntry::Composite(Arc::new(definition.composite_config()?))
            } else {
                CatalogEntry::Table(Arc::new(definition.table_config()?))
            };
            if entries.insert(definition.record.clone(), entry).is_some() {
                return Err(ConfigError::DuplicateEntity(definition.record));
            }
        }

        info!(
            "event=catalog_load module=config status=ok entities={}",
            entries.len()
        );
        Ok(Self { entries })
    }

    /// Parses a JSON array of entity definitions.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let definitions: Vec<EntityDefinition> =
            serde_json::from_str(text).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        Self::from_definitions(definitions)
    }

    /// Reads and parses a JSON catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Malformed(format!("cannot read `{}`: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Returns the table descriptor of `record`. Join tables are included.
    pub fn table(&self, record: &str) -> Option<Arc<TableConfig>> {
        match self.entries.get(record)? {
            CatalogEntry::Table(config) => Some(config.clone()),
            CatalogEntry::Composite(config) => Some(config.table_config().clone()),
        }
    }

    /// Returns the join-table descriptor of `record`, if it declares one.
    pub fn composite(&self, record: &str) -> Option<Arc<CompositeConfig>> {
        match self.entries.get(record)? {
            CatalogEntry::Composite(config) => Some(config.clone()),
            CatalogEntry::Table(_) => None,
        }
    }

    /// Declared record kinds in sorted order.
    pub fn records(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
