//! Data storage and assembly
//!
//! SQLite entity store, the record types collaborators exchange with it,
//! and feature table assembly.

pub mod database;
pub mod dataset;
pub mod records;

pub use database::Database;
pub use dataset::FeatureBuilder;
