//! Repository for two-foreign-key join tables.
//!
//! # Responsibility
//! - Scope find/remove/create/update/save to one side or both sides of a
//!   many-to-many relation.
//! - Forward plain CRUD to the wrapped [`Repository`].
//!
//! # Invariants
//! - Relation operations require both foreign keys to be non-empty.
//! - Foreign keys passed explicitly always win; extra conditions or
//!   attributes that disagree with them are rejected.
//! - Relation reads and updates walk rows newest first (primary key
//!   descending).
//! - Relation updates never rewrite the primary key.

use crate::error::{ConfigError, RepoResult};
use crate::model::record::{Attributes, Record};
use crate::model::value::FieldValue;
use crate::repo::query::{Conditions, OrderBy, QueryExecutor};
use crate::repo::table_repo::{FindOptions, Found, Repository, SaveOutcome, TableAccess, TableConfig};
use rusqlite::Connection;
use std::sync::Arc;

/// Static descriptor of a join table: a table plus its `from`/`to` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeConfig {
    table: Arc<TableConfig>,
    fk_from: String,
    fk_to: String,
}

impl CompositeConfig {
    /// # Errors
    /// - `UnknownField` when a key is not a declared field.
    /// - `InvalidRelationKeys` when the keys coincide with each other or with
    ///   the primary key.
    pub fn new(
        table: TableConfig,
        fk_from: impl Into<String>,
        fk_to: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let fk_from = fk_from.into();
        let fk_to = fk_to.into();
        table.ensure_field(&fk_from)?;
        table.ensure_field(&fk_to)?;

        let invalid = |reason: &str| ConfigError::InvalidRelationKeys {
            table: table.table().to_string(),
            reason: reason.to_string(),
        };
        if fk_from == fk_to {
            return Err(invalid("from and to keys must differ"));
        }
        if fk_from == table.primary_key() || fk_to == table.primary_key() {
            return Err(invalid("foreign keys must differ from the primary key"));
        }

        Ok(Self {
            table: Arc::new(table),
            fk_from,
            fk_to,
        })
    }

    pub fn table_config(&self) -> &Arc<TableConfig> {
        &self.table
    }

    pub fn fk_from(&self) -> &str {
        &self.fk_from
    }

    pub fn fk_to(&self) -> &str {
        &self.fk_to
    }
}

impl TableAccess for CompositeConfig {
    fn table(&self) -> &str {
        self.table.table()
    }

    fn primary_key(&self) -> &str {
        self.table.primary_key()
    }

    fn fields(&self) -> &[String] {
        self.table.fields()
    }
}

/// CRUD accessor for a join table with relation-scoped operations.
pub struct CompositeRepository<'db, X: QueryExecutor + ?Sized = Connection> {
    base: Repository<'db, X>,
    config: Arc<CompositeConfig>,
}

impl<'db, X: QueryExecutor + ?Sized> CompositeRepository<'db, X> {
    pub fn new(db: &'db X, config: Arc<CompositeConfig>) -> Self {
        Self {
            base: Repository::new(db, config.table.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Arc<CompositeConfig> {
        &self.config
    }

    /// The plain table repository this relation repository wraps.
    pub fn base(&self) -> &Repository<'db, X> {
        &self.base
    }

    pub fn find(&self, id: impl Into<FieldValue>, options: &FindOptions) -> RepoResult<Found> {
        self.base.find(id, options)
    }

    pub fn remove(&self, conditions: &Conditions, limit: u32) -> RepoResult<usize> {
        self.base.remove(conditions, limit)
    }

    pub fn create(&self, attributes: Attributes) -> RepoResult<Record> {
        self.base.create(attributes)
    }

    pub fn update(&self, record: &Record, limit: u32) -> RepoResult<usize> {
        self.base.update(record, limit)
    }

    pub fn save(&self, record: &Record) -> RepoResult<SaveOutcome> {
        self.base.save(record)
    }

    /// Finds rows by the `from` key only. An empty key adds no condition.
    pub fn find_from(
        &self,
        fk_from: impl Into<FieldValue>,
        options: &FindOptions,
    ) -> RepoResult<Found> {
        self.find_one_side("find_from", &self.config.fk_from, fk_from.into(), options)
    }

    /// Finds rows by the `to` key only. An empty key adds no condition.
    pub fn find_to(&self, fk_to: impl Into<FieldValue>, options: &FindOptions) -> RepoResult<Found> {
        self.find_one_side("find_to", &self.config.fk_to, fk_to.into(), options)
    }

    /// Finds rows linking `fk_from` to `fk_to`, most recent first.
    ///
    /// # Errors
    /// - `EmptyForeignKey` when either key is empty.
    /// - `NoResult` when the relation does not exist.
    pub fn find_relation(
        &self,
        fk_from: impl Into<FieldValue>,
        fk_to: impl Into<FieldValue>,
        options: &FindOptions,
    ) -> RepoResult<Found> {
        let op = "find_relation";
        let conditions =
            self.relation_conditions(op, fk_from.into(), fk_to.into(), &options.conditions)?;
        let order = self.newest_first();
        self.base.fetch(
            op,
            &options.projection,
            &conditions,
            Some(&order),
            options.limit,
        )
    }

    /// Deletes up to `limit` rows linking `fk_from` to `fk_to`.
    ///
    /// # Errors
    /// - `EmptyForeignKey` when either key is empty; nothing is deleted.
    pub fn remove_relation(
        &self,
        fk_from: impl Into<FieldValue>,
        fk_to: impl Into<FieldValue>,
        extra: &Conditions,
        limit: u32,
    ) -> RepoResult<usize> {
        let op = "remove_relation";
        let conditions = self.relation_conditions(op, fk_from.into(), fk_to.into(), extra)?;
        self.base.delete_where(op, &conditions, limit)
    }

    /// Builds an unsaved relation record. No I/O.
    ///
    /// # Errors
    /// - `EmptyForeignKey` when either key is empty.
    /// - `ForeignKeyOverride` when `attributes` carries a different value for
    ///   a foreign-key column.
    pub fn create_relation(
        &self,
        fk_from: impl Into<FieldValue>,
        fk_to: impl Into<FieldValue>,
        attributes: Attributes,
    ) -> RepoResult<Record> {
        let op = "create_relation";
        let attributes = self.relation_conditions(op, fk_from.into(), fk_to.into(), &attributes)?;
        Record::new(self.config.table.schema().clone(), attributes)
            .map_err(|err| self.base.reject(op, err.into()))
    }

    /// Updates the relation row(s) identified by the record's foreign keys and
    /// primary key (when set). The primary key itself is never written.
    ///
    /// # Errors
    /// - `TypeMismatch` when `record` belongs to another schema.
    /// - `EmptyForeignKey` when either of the record's keys is empty.
    /// - `ForeignKeyOverride` / `PrimaryKeyOverride` when `extra` pins a key
    ///   column to a different value than the record.
    pub fn update_relation(
        &self,
        record: &Record,
        extra: &Conditions,
        limit: u32,
    ) -> RepoResult<usize> {
        let op = "update_relation";
        self.base.ensure_kind(op, record)?;

        let side = |column: &str| record.get(column).cloned().unwrap_or_default();
        let mut conditions = self.relation_conditions(
            op,
            side(self.config.fk_from.as_str()),
            side(self.config.fk_to.as_str()),
            extra,
        )?;

        let primary_key = self.config.table.primary_key();
        if let Some(id) = record.get(primary_key).filter(|id| !id.is_empty()) {
            if conditions
                .get(primary_key)
                .is_some_and(|existing| !existing.same_value(id))
            {
                return Err(self.base.reject(
                    op,
                    ConfigError::PrimaryKeyOverride {
                        table: self.config.table().to_string(),
                        primary_key: primary_key.to_string(),
                    }
                    .into(),
                ));
            }
            conditions.insert(primary_key.to_string(), id.clone());
        }

        let mut values = record.prepare_for_update();
        values.remove(primary_key);

        let order = self.newest_first();
        self.base
            .update_where(op, &values, &conditions, Some(&order), limit)
    }

    /// Inserts the relation record unconditionally and returns its row id.
    pub fn save_relation(&self, record: &Record) -> RepoResult<i64> {
        let op = "save_relation";
        self.base.ensure_kind(op, record)?;
        self.base.insert_record(op, record)
    }

    fn find_one_side(
        &self,
        op: &'static str,
        column: &str,
        value: FieldValue,
        options: &FindOptions,
    ) -> RepoResult<Found> {
        let mut conditions = options.conditions.clone();
        if !value.is_empty() {
            self.pin_key(op, &mut conditions, column, value)?;
        }
        self.base
            .fetch(op, &options.projection, &conditions, None, options.limit)
    }

    /// Merges both foreign keys into `extra`, rejecting empty keys and
    /// conflicting values.
    fn relation_conditions(
        &self,
        op: &'static str,
        fk_from: FieldValue,
        fk_to: FieldValue,
        extra: &Attributes,
    ) -> RepoResult<Attributes> {
        for (column, value) in [(&self.config.fk_from, &fk_from), (&self.config.fk_to, &fk_to)] {
            if value.is_empty() {
                return Err(self.base.reject(
                    op,
                    ConfigError::EmptyForeignKey {
                        table: self.config.table().to_string(),
                        column: column.clone(),
                    }
                    .into(),
                ));
            }
        }

        let mut merged = extra.clone();
        self.pin_key(op, &mut merged, &self.config.fk_from, fk_from)?;
        self.pin_key(op, &mut merged, &self.config.fk_to, fk_to)?;
        Ok(merged)
    }

    fn pin_key(
        &self,
        op: &'static str,
        target: &mut Attributes,
        column: &str,
        value: FieldValue,
    ) -> RepoResult<()> {
        if target
            .get(column)
            .is_some_and(|existing| !existing.same_value(&value))
        {
            return Err(self.base.reject(
                op,
                ConfigError::ForeignKeyOverride {
                    table: self.config.table().to_string(),
                    column: column.to_string(),
                }
                .into(),
            ));
        }
        target.insert(column.to_string(), value);
        Ok(())
    }

    fn newest_first(&self) -> OrderBy {
        OrderBy::desc(self.config.table.primary_key())
    }
}

impl<X: QueryExecutor + ?Sized> TableAccess for CompositeRepository<'_, X> {
    fn table(&self) -> &str {
        self.config.table()
    }

    fn primary_key(&self) -> &str {
        self.config.primary_key()
    }

    fn fields(&self) -> &[String] {
        self.config.fields()
    }
}
