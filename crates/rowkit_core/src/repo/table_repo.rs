//! Generic per-table repository.
//!
//! # Responsibility
//! - Bind one table, primary key and record schema to CRUD operations.
//! - Map executor rows back into records of the bound schema.
//!
//! # Invariants
//! - Contract checks (type, primary key, empty conditions, unknown fields,
//!   zero limit) fail before any statement is issued.
//! - `remove` never runs without conditions.
//! - `find` never returns an empty result; zero rows is `NoResult`.

use crate::db::is_valid_identifier;
use crate::error::{ConfigError, RepoError, RepoResult};
use crate::model::record::{Attributes, Record, RecordSchema};
use crate::model::value::FieldValue;
use crate::repo::query::{
    Conditions, DeleteQuery, InsertQuery, OrderBy, Projection, QueryExecutor, SelectQuery,
    UpdateQuery,
};
use log::{debug, warn};
use rusqlite::Connection;
use std::sync::Arc;

/// Static descriptor of one table-backed entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConfig {
    table: String,
    primary_key: String,
    schema: Arc<RecordSchema>,
}

impl TableConfig {
    /// # Errors
    /// - `InvalidIdentifier` when `table` is not a plain identifier.
    /// - `UnknownField` when `primary_key` is not a declared schema field.
    pub fn new(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        schema: Arc<RecordSchema>,
    ) -> Result<Self, ConfigError> {
        let table = table.into();
        let primary_key = primary_key.into();
        if !is_valid_identifier(&table) {
            return Err(ConfigError::InvalidIdentifier(table));
        }
        schema.ensure_field(&primary_key)?;
        Ok(Self {
            table,
            primary_key,
            schema,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn fields(&self) -> &[String] {
        self.schema.fields()
    }

    pub(crate) fn ensure_field(&self, field: &str) -> Result<(), ConfigError> {
        if self.schema.has_field(field) {
            return Ok(());
        }
        Err(ConfigError::UnknownField {
            scope: self.table.clone(),
            field: field.to_string(),
        })
    }
}

/// Options of a find: projection, extra conditions and row limit.
///
/// Defaults to all columns, no extra conditions and a limit of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub projection: Projection,
    pub conditions: Conditions,
    pub limit: u32,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            projection: Projection::All,
            conditions: Conditions::new(),
            limit: 1,
        }
    }
}

impl FindOptions {
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Result of a find: one record for `limit == 1`, otherwise a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Found {
    One(Record),
    Many(Vec<Record>),
}

impl Found {
    /// Returns the single record, or the first one of a sequence.
    pub fn into_one(self) -> Option<Record> {
        match self {
            Self::One(record) => Some(record),
            Self::Many(records) => records.into_iter().next(),
        }
    }

    pub fn into_vec(self) -> Vec<Record> {
        match self {
            Self::One(record) => vec![record],
            Self::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of [`Repository::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new row was inserted with the storage-assigned row id.
    Inserted { row_id: i64 },
    /// An existing row was updated through its primary key.
    Updated { rows: usize },
}

/// Read-only table metadata used to compose qualified column references.
pub trait TableAccess {
    fn table(&self) -> &str;
    fn primary_key(&self) -> &str;
    fn fields(&self) -> &[String];

    /// Returns `table.field` for a declared field.
    ///
    /// # Errors
    /// - `UnknownField` when `field` is not declared for this table.
    fn prefix_field(&self, field: &str) -> RepoResult<String> {
        if !self.fields().iter().any(|declared| declared == field) {
            return Err(ConfigError::UnknownField {
                scope: self.table().to_string(),
                field: field.to_string(),
            }
            .into());
        }
        Ok(format!("{}.{}", self.table(), field))
    }

    /// Returns the inner-join predicate `this.key=other.key`, where `key` is
    /// the other table's primary key.
    fn join_cond(&self, other: &dyn TableAccess) -> RepoResult<String> {
        let key = other.primary_key();
        Ok(format!(
            "{}={}",
            self.prefix_field(key)?,
            other.prefix_field(key)?
        ))
    }
}

impl TableAccess for TableConfig {
    fn table(&self) -> &str {
        &self.table
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn fields(&self) -> &[String] {
        self.schema.fields()
    }
}

/// CRUD accessor for one table.
pub struct Repository<'db, X: QueryExecutor + ?Sized = Connection> {
    db: &'db X,
    config: Arc<TableConfig>,
}

impl<'db, X: QueryExecutor + ?Sized> Repository<'db, X> {
    pub fn new(db: &'db X, config: Arc<TableConfig>) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &Arc<TableConfig> {
        &self.config
    }

    /// Finds rows by primary key and/or extra conditions.
    ///
    /// An empty `id` adds no primary-key condition.
    ///
    /// # Errors
    /// - `NoResult` when zero rows match.
    /// - `Configuration` for unknown fields or a zero limit.
    pub fn find(&self, id: impl Into<FieldValue>, options: &FindOptions) -> RepoResult<Found> {
        let id = id.into();
        let mut conditions = options.conditions.clone();
        if !id.is_empty() {
            conditions.insert(self.config.primary_key.clone(), id);
        }
        self.fetch("find", &options.projection, &conditions, None, options.limit)
    }

    /// Deletes up to `limit` rows matching `conditions`.
    ///
    /// # Errors
    /// - `EmptyConditions` when `conditions` is empty; nothing is deleted.
    pub fn remove(&self, conditions: &Conditions, limit: u32) -> RepoResult<usize> {
        if conditions.is_empty() {
            return Err(self.reject(
                "remove",
                ConfigError::EmptyConditions {
                    table: self.config.table.clone(),
                }
                .into(),
            ));
        }
        self.delete_where("remove", conditions, limit)
    }

    /// Builds a new unsaved record of the bound schema. No I/O.
    pub fn create(&self, attributes: Attributes) -> RepoResult<Record> {
        Ok(Record::new(self.config.schema.clone(), attributes)?)
    }

    /// Writes the non-empty attributes of `record` to the row matching its
    /// primary key.
    ///
    /// # Errors
    /// - `TypeMismatch` when `record` belongs to another schema.
    /// - `MissingPrimaryKey` when the record's primary key is empty.
    pub fn update(&self, record: &Record, limit: u32) -> RepoResult<usize> {
        self.ensure_kind("update", record)?;
        let primary_key = self.config.primary_key.as_str();
        let id = match record.get(primary_key) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                return Err(self.reject(
                    "update",
                    ConfigError::MissingPrimaryKey {
                        table: self.config.table.clone(),
                        primary_key: primary_key.to_string(),
                    }
                    .into(),
                ))
            }
        };

        let values = record.prepare_for_update();
        let conditions = Conditions::from([(primary_key.to_string(), id)]);
        self.update_where("update", &values, &conditions, None, limit)
    }

    /// Updates the record when it carries a primary key, inserts it otherwise.
    pub fn save(&self, record: &Record) -> RepoResult<SaveOutcome> {
        self.ensure_kind("save", record)?;
        if record.has_value(&self.config.primary_key) {
            let rows = self.update(record, 1)?;
            return Ok(SaveOutcome::Updated { rows });
        }
        let row_id = self.insert_record("save", record)?;
        Ok(SaveOutcome::Inserted { row_id })
    }

    pub(crate) fn fetch(
        &self,
        op: &'static str,
        projection: &Projection,
        conditions: &Conditions,
        order_by: Option<&OrderBy>,
        limit: u32,
    ) -> RepoResult<Found> {
        self.check_limit(op, limit)?;
        self.check_columns(op, conditions.keys())?;
        self.check_columns(op, projection.columns().iter())?;

        let rows = self.db.select(&SelectQuery {
            table: &self.config.table,
            projection,
            conditions,
            order_by,
            limit,
        })?;
        if rows.is_empty() {
            debug!(
                "event=repo_{op} module=repo status=no_result table={}",
                self.config.table
            );
            return Err(RepoError::NoResult {
                table: self.config.table.clone(),
            });
        }

        let mut records = rows
            .into_iter()
            .map(|row| self.map_row(row))
            .collect::<RepoResult<Vec<_>>>()?;
        debug!(
            "event=repo_{op} module=repo status=ok table={} rows={}",
            self.config.table,
            records.len()
        );

        if limit == 1 {
            return Ok(Found::One(records.remove(0)));
        }
        Ok(Found::Many(records))
    }

    pub(crate) fn delete_where(
        &self,
        op: &'static str,
        conditions: &Conditions,
        limit: u32,
    ) -> RepoResult<usize> {
        self.check_limit(op, limit)?;
        self.check_columns(op, conditions.keys())?;
        let rows = self.db.delete(&DeleteQuery {
            table: &self.config.table,
            key: &self.config.primary_key,
            conditions,
            limit,
        })?;
        debug!(
            "event=repo_{op} module=repo status=ok table={} rows={rows}",
            self.config.table
        );
        Ok(rows)
    }

    pub(crate) fn update_where(
        &self,
        op: &'static str,
        values: &Attributes,
        conditions: &Conditions,
        order_by: Option<&OrderBy>,
        limit: u32,
    ) -> RepoResult<usize> {
        self.check_limit(op, limit)?;
        self.check_columns(op, conditions.keys())?;
        let rows = self.db.update(&UpdateQuery {
            table: &self.config.table,
            key: &self.config.primary_key,
            values,
            conditions,
            order_by,
            limit,
        })?;
        debug!(
            "event=repo_{op} module=repo status=ok table={} rows={rows}",
            self.config.table
        );
        Ok(rows)
    }

    pub(crate) fn insert_record(&self, op: &'static str, record: &Record) -> RepoResult<i64> {
        let values = record
            .prepare_for_insert()
            .map_err(|err| self.reject(op, err.into()))?;
        let row_id = self.db.insert(&InsertQuery {
            table: &self.config.table,
            values: &values,
        })?;
        debug!(
            "event=repo_{op} module=repo status=ok table={} row_id={row_id}",
            self.config.table
        );
        Ok(row_id)
    }

    pub(crate) fn ensure_kind(&self, op: &'static str, record: &Record) -> RepoResult<()> {
        if record.is_kind_of(&self.config.schema) {
            return Ok(());
        }
        Err(self.reject(
            op,
            RepoError::TypeMismatch {
                expected: self.config.schema.kind().to_string(),
                actual: record.kind().to_string(),
            },
        ))
    }

    /// Logs a contract failure and hands the error back.
    pub(crate) fn reject(&self, op: &'static str, err: RepoError) -> RepoError {
        warn!(
            "event=repo_{op} module=repo status=error table={} error_code={} error={}",
            self.config.table,
            err.code(),
            err
        );
        err
    }

    fn check_limit(&self, op: &'static str, limit: u32) -> RepoResult<()> {
        if limit == 0 {
            return Err(self.reject(op, ConfigError::ZeroLimit.into()));
        }
        Ok(())
    }

    fn check_columns<'a>(
        &self,
        op: &'static str,
        mut columns: impl Iterator<Item = &'a String>,
    ) -> RepoResult<()> {
        match columns.try_for_each(|column| self.config.ensure_field(column)) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.reject(op, err.into())),
        }
    }

    fn map_row(&self, row: Attributes) -> RepoResult<Record> {
        if let Some(column) = row.keys().find(|column| !self.config.schema.has_field(column)) {
            return Err(RepoError::InvalidData(format!(
                "column `{column}` is not a declared field of `{}`",
                self.config.table
            )));
        }
        Ok(Record::from_storage(self.config.schema.clone(), row))
    }
}

impl<X: QueryExecutor + ?Sized> TableAccess for Repository<'_, X> {
    fn table(&self) -> &str {
        &self.config.table
    }

    fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    fn fields(&self) -> &[String] {
        self.config.fields()
    }
}
