//! Shared type definitions for basemodel
//!
//! This crate provides the small enums used across the basemodel crates:
//!
//! - [`Dialect`] - SQL dialect tag (SQLite, PostgreSQL, MySQL, MSSQL)
//! - [`ColumnType`] - UI-level column kind driving value coercion and export
//!
//! # Features
//!
//! - `serde` - Enable serde serialization/deserialization (enabled by default)

mod column_type;
mod dialect;

pub use column_type::{ColumnType, StorageClass};
pub use dialect::{Dialect, DialectParseError};

/// Prelude module for commonly used types
pub mod prelude {
    pub use crate::{ColumnType, Dialect};
}
