//! Generic table and join-table repositories over a pluggable query executor.
//! Ships a SQLite executor built on `rusqlite`.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::entity::{EntityCatalog, EntityDefinition, RelationKeys};
pub use error::{ConfigError, RepoError, RepoResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{attributes, Attributes, Record, RecordSchema, RecordSchemaBuilder};
pub use model::value::FieldValue;
pub use repo::composite_repo::{CompositeConfig, CompositeRepository};
pub use repo::query::{
    Conditions, DeleteQuery, InsertQuery, OrderBy, Projection, QueryExecutor, SelectQuery,
    SortDirection, UpdateQuery,
};
pub use repo::table_repo::{FindOptions, Found, Repository, SaveOutcome, TableAccess, TableConfig};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
