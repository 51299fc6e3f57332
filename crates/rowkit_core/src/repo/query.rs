//! Query descriptions and the executor seam.
//!
//! # Responsibility
//! - Describe select/insert/update/delete requests without SQL text.
//! - Provide the SQLite executor used by default.
//!
//! # Invariants
//! - Identifiers in descriptions are validated by repositories before they
//!   reach an executor; values are always bound parameters.
//! - Limited deletes and updates touch at most `limit` rows, selected through
//!   the table key so tables declared `WITHOUT ROWID` work too.

use crate::db::{quote_identifier, DbResult};
use crate::model::record::Attributes;
use crate::model::value::FieldValue;
use rusqlite::{params_from_iter, Connection};

/// Equality conditions joined with `AND`. A `Null` value matches `IS NULL`.
pub type Conditions = Attributes;

/// Column projection of a select.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Fields(Vec<String>),
}

impl Projection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }

    /// Projected column names; empty for `All`.
    pub fn columns(&self) -> &[String] {
        match self {
            Self::All => &[],
            Self::Fields(fields) => fields,
        }
    }

    fn to_sql(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Fields(fields) if fields.is_empty() => "*".to_string(),
            Self::Fields(fields) => fields
                .iter()
                .map(|field| quote_identifier(field))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectQuery<'a> {
    pub table: &'a str,
    pub projection: &'a Projection,
    pub conditions: &'a Conditions,
    pub order_by: Option<&'a OrderBy>,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteQuery<'a> {
    pub table: &'a str,
    /// Unique key column used to cap the delete at `limit` rows.
    pub key: &'a str,
    pub conditions: &'a Conditions,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct InsertQuery<'a> {
    pub table: &'a str,
    pub values: &'a Attributes,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateQuery<'a> {
    pub table: &'a str,
    /// Unique key column used to cap the update at `limit` rows.
    pub key: &'a str,
    pub values: &'a Attributes,
    pub conditions: &'a Conditions,
    pub order_by: Option<&'a OrderBy>,
    pub limit: u32,
}

/// Storage collaborator that runs query descriptions.
///
/// Implementations execute exactly one statement per call and block until it
/// finishes.
pub trait QueryExecutor {
    /// Returns matching rows as column-name keyed maps, in result order.
    fn select(&self, query: &SelectQuery<'_>) -> DbResult<Vec<Attributes>>;
    /// Returns the number of deleted rows.
    fn delete(&self, query: &DeleteQuery<'_>) -> DbResult<usize>;
    /// Returns the storage-assigned row id of the new row. Tables declared
    /// `WITHOUT ROWID` assign none; callers supply their key instead.
    fn insert(&self, query: &InsertQuery<'_>) -> DbResult<i64>;
    /// Returns the number of updated rows.
    fn update(&self, query: &UpdateQuery<'_>) -> DbResult<usize>;
}

impl QueryExecutor for Connection {
    fn select(&self, query: &SelectQuery<'_>) -> DbResult<Vec<Attributes>> {
        let (sql, binds) = select_sql(query);
        let mut stmt = self.prepare(&sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Attributes::new();
            for (index, column) in columns.iter().enumerate() {
                values.insert(column.clone(), row.get::<_, FieldValue>(index)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    fn delete(&self, query: &DeleteQuery<'_>) -> DbResult<usize> {
        let (sql, binds) = delete_sql(query);
        Ok(self.execute(&sql, params_from_iter(binds.iter()))?)
    }

    fn insert(&self, query: &InsertQuery<'_>) -> DbResult<i64> {
        let (sql, binds) = insert_sql(query);
        self.execute(&sql, params_from_iter(binds.iter()))?;
        Ok(self.last_insert_rowid())
    }

    fn update(&self, query: &UpdateQuery<'_>) -> DbResult<usize> {
        if query.values.is_empty() {
            return Ok(0);
        }
        let (sql, binds) = update_sql(query);
        Ok(self.execute(&sql, params_from_iter(binds.iter()))?)
    }
}

fn where_sql(conditions: &Conditions, binds: &mut Vec<FieldValue>) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = conditions
        .iter()
        .map(|(column, value)| {
            let column = quote_identifier(column);
            if *value == FieldValue::Null {
                format!("{column} IS NULL")
            } else {
                binds.push(value.clone());
                format!("{column} = ?")
            }
        })
        .collect();
    format!(" WHERE {}", clauses.join(" AND "))
}

fn order_sql(order_by: Option<&OrderBy>) -> String {
    order_by.map_or_else(String::new, |order| {
        format!(
            " ORDER BY {} {}",
            quote_identifier(&order.column),
            order.direction.as_sql()
        )
    })
}

/// Key sub-select that caps limited deletes and updates.
fn limited_keys_sql(
    table: &str,
    key: &str,
    conditions: &Conditions,
    order_by: Option<&OrderBy>,
    limit: u32,
    binds: &mut Vec<FieldValue>,
) -> String {
    let filter = where_sql(conditions, binds);
    binds.push(FieldValue::from(limit));
    let key = quote_identifier(key);
    format!(
        "{key} IN (SELECT {key} FROM {table}{filter}{} LIMIT ?)",
        order_sql(order_by)
    )
}

fn select_sql(query: &SelectQuery<'_>) -> (String, Vec<FieldValue>) {
    let mut binds = Vec::new();
    let filter = where_sql(query.conditions, &mut binds);
    binds.push(FieldValue::from(query.limit));
    let sql = format!(
        "SELECT {} FROM {}{filter}{} LIMIT ?",
        query.projection.to_sql(),
        quote_identifier(query.table),
        order_sql(query.order_by)
    );
    (sql, binds)
}

fn delete_sql(query: &DeleteQuery<'_>) -> (String, Vec<FieldValue>) {
    let table = quote_identifier(query.table);
    let mut binds = Vec::new();
    let keys = limited_keys_sql(
        &table,
        query.key,
        query.conditions,
        None,
        query.limit,
        &mut binds,
    );
    (format!("DELETE FROM {table} WHERE {keys}"), binds)
}

fn insert_sql(query: &InsertQuery<'_>) -> (String, Vec<FieldValue>) {
    let table = quote_identifier(query.table);
    if query.values.is_empty() {
        return (format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new());
    }
    let columns: Vec<String> = query.values.keys().map(|c| quote_identifier(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let binds = query.values.values().cloned().collect();
    (
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        binds,
    )
}

fn update_sql(query: &UpdateQuery<'_>) -> (String, Vec<FieldValue>) {
    let table = quote_identifier(query.table);
    let mut binds: Vec<FieldValue> = Vec::new();
    let assignments: Vec<String> = query
        .values
        .iter()
        .map(|(column, value)| {
            binds.push(value.clone());
            format!("{} = ?", quote_identifier(column))
        })
        .collect();
    let keys = limited_keys_sql(
        &table,
        query.key,
        query.conditions,
        query.order_by,
        query.limit,
        &mut binds,
    );
    (
        format!("UPDATE {table} SET {} WHERE {keys}", assignments.join(", ")),
        binds,
    )
}
