//! Error types shared by records, repositories and the entity catalog.
//!
//! # Invariants
//! - Contract violations (`Configuration`, `TypeMismatch`) are raised before
//!   any statement reaches the query executor.
//! - Storage failures are surfaced unchanged; nothing here retries.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Programmer-error conditions detected while configuring or calling the
/// data-access layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyRecordKind,
    EmptyFieldSet { record: String },
    DuplicateField { record: String, field: String },
    InvalidIdentifier(String),
    UnknownField { scope: String, field: String },
    MissingDefaults { record: String },
    MissingRequiredField { record: String, field: String },
    EmptyConditions { table: String },
    MissingPrimaryKey { table: String, primary_key: String },
    EmptyForeignKey { table: String, column: String },
    ForeignKeyOverride { table: String, column: String },
    PrimaryKeyOverride { table: String, primary_key: String },
    InvalidRelationKeys { table: String, reason: String },
    ZeroLimit,
    DuplicateEntity(String),
    MissingRelation { record: String },
    Malformed(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRecordKind => write!(f, "record kind cannot be empty"),
            Self::EmptyFieldSet { record } => {
                write!(f, "record `{record}` must declare at least one field")
            }
            Self::DuplicateField { record, field } => {
                write!(f, "record `{record}` declares field `{field}` twice")
            }
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
            Self::UnknownField { scope, field } => {
                write!(f, "field `{field}` is not declared by `{scope}`")
            }
            Self::MissingDefaults { record } => {
                write!(f, "record `{record}` defaults cannot be empty")
            }
            Self::MissingRequiredField { record, field } => {
                write!(f, "record `{record}` is missing required field `{field}`")
            }
            Self::EmptyConditions { table } => {
                write!(f, "conditions cannot be empty on remove from `{table}`")
            }
            Self::MissingPrimaryKey { table, primary_key } => write!(
                f,
                "cannot update `{table}` without primary key `{primary_key}`"
            ),
            Self::EmptyForeignKey { table, column } => write!(
                f,
                "foreign key `{column}` cannot be empty on composite table `{table}`"
            ),
            Self::ForeignKeyOverride { table, column } => write!(
                f,
                "foreign key `{column}` of `{table}` cannot be overridden by caller attributes"
            ),
            Self::PrimaryKeyOverride { table, primary_key } => write!(
                f,
                "primary key `{primary_key}` of `{table}` conflicts with the record being updated"
            ),
            Self::InvalidRelationKeys { table, reason } => {
                write!(f, "invalid relation keys for `{table}`: {reason}")
            }
            Self::ZeroLimit => write!(f, "limit must be at least 1"),
            Self::DuplicateEntity(name) => write!(f, "entity `{name}` is defined twice"),
            Self::MissingRelation { record } => {
                write!(f, "entity `{record}` does not declare relation keys")
            }
            Self::Malformed(message) => write!(f, "malformed entity definition: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Error returned by every repository operation.
#[derive(Debug)]
pub enum RepoError {
    /// A find matched zero rows.
    NoResult { table: String },
    Configuration(ConfigError),
    /// A record bound to another schema was handed to a repository.
    TypeMismatch { expected: String, actual: String },
    Db(DbError),
    InvalidData(String),
}

impl RepoError {
    /// Returns whether this is the "zero rows matched" outcome of a find.
    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::NoResult { .. })
    }

    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::NoResult { .. } => "no_result",
            Self::Configuration(_) => "configuration",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Db(_) => "db",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoResult { table } => write!(f, "no results in `{table}`"),
            Self::Configuration(err) => write!(f, "{err}"),
            Self::TypeMismatch { expected, actual } => write!(
                f,
                "record type mismatch: expected `{expected}`, got `{actual}`"
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid stored row: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NoResult { .. } | Self::TypeMismatch { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<ConfigError> for RepoError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
