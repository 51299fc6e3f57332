//! Record model: column values, record schemas and in-memory rows.
//!
//! # Invariants
//! - Field sets are declared explicitly; nothing is discovered at runtime.
//! - Records are transient and never shared between operations.

pub mod record;
pub mod value;
