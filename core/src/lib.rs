//! Core building blocks for basemodel.
//!
//! - [`Value`] and [`Row`]: dynamically typed rows for runtime-described tables
//! - [`SQL`]: dialect-free fragment builder rendered per [`Dialect`]
//! - [`filter`]: the `where` grammar and condition objects, compiled to SQL
//! - [`builder`]: SELECT/INSERT/UPDATE/DELETE statements and unions
//! - [`driver`]: the connection and transaction traits drivers implement

pub mod builder;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod filter;
pub mod helpers;
pub mod row;
pub mod sql;
mod tracing;
pub mod value;

pub use builder::{DeleteQuery, InsertQuery, Returning, SelectQuery, UpdateQuery, union_all};
pub use dialect::{Dialect, DialectExt};
pub use driver::{Connection, Driver, ExecuteOutcome, Transaction};
pub use error::{BaseModelError, Result};
pub use filter::{ColumnRef, ColumnResolver, FilterExpr, ResolvedColumn, parse_condition, parse_where};
pub use helpers::OrderBy;
pub use sql::{SQL, SQLChunk, Token};
pub use value::{Row, Value};

#[doc(hidden)]
pub mod __private {
    pub use ::tracing;
}
