//! Repository layer: generic table and join-table accessors.
//!
//! # Responsibility
//! - Turn CRUD calls into query descriptions for a `QueryExecutor`.
//! - Keep SQL text inside the executor boundary.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NoResult`, `Configuration`,
//!   `TypeMismatch`) in addition to storage errors.
//! - Each operation issues at most one statement.

pub mod composite_repo;
pub mod query;
pub mod table_repo;
