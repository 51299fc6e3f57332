//! Dynamically typed column values.
//!
//! # Invariants
//! - Each variant maps onto exactly one SQLite storage class.
//! - "Empty" follows loose form-input semantics: null, zero, `0.0`, `""` and
//!   `"0"` are empty. Only `Integer(0)` counts as an exact zero.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One column value of a record, a condition or a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Returns whether this value counts as "not supplied".
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Integer(value) => *value == 0,
            Self::Real(value) => *value == 0.0,
            Self::Text(value) => value.is_empty() || value == "0",
        }
    }

    /// Returns whether this value is the integer zero, which partial updates
    /// keep even though it is empty.
    pub fn is_exact_zero(&self) -> bool {
        matches!(self, Self::Integer(0))
    }

    /// Compares values the way a numeric column stores them: `Integer(5)`,
    /// `Real(5.0)` and `Text("5")` are the same value. Non-numeric values
    /// compare exactly.
    pub fn same_value(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        match (self.as_number(), other.as_number()) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Self::Null),
            ValueRef::Integer(v) => Ok(Self::Integer(v)),
            ValueRef::Real(v) => Ok(Self::Real(v)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| Self::Text(text.to_string()))
                .map_err(|err| FromSqlError::Other(Box::new(err))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}
