//! Entity configuration.
//!
//! # Responsibility
//! - Load table/relation descriptors from declarative JSON definitions.
//! - Hand out shared descriptors so repositories never rebuild them.

pub mod entity;
