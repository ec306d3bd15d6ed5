//! # basemodel
//!
//! Relational query execution over tables that are only known at runtime.
//!
//! Table metadata (columns, aliases, relations, lookups and rollups) is
//! registered in a [`SchemaRegistry`]; a [`ModelContext`] hands out a
//! [`BaseModel`] per table that lists, counts, aggregates, exports and writes
//! rows, resolving nested relations in batches instead of one query per row.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use basemodel::sqlite::SqliteDriver;
//! use basemodel::{ModelContext, QueryArgs, QueryConfig, SchemaRegistry};
//! use std::sync::Arc;
//!
//! # async fn run(registry: Arc<SchemaRegistry>) -> basemodel::Result<()> {
//! let driver = Arc::new(SqliteDriver::open_in_memory()?);
//! let context = ModelContext::new(driver, registry, QueryConfig::default());
//!
//! let orders = context.model("orders")?;
//! let args = QueryArgs::new()
//!     .with("where", "(Status,eq,open)")
//!     .with("sort", "-CreatedAt")
//!     .with("limit", 10);
//! let page = orders.nested_list(&args, None).await?;
//! for row in page.iter() {
//!     println!("{:?}", row.get("ItemsList"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Database Support
//!
//! | Database   | Driver         | Feature Flag     |
//! |------------|----------------|------------------|
//! | SQLite     | rusqlite       | `rusqlite`       |
//! | PostgreSQL | tokio-postgres | `tokio-postgres` |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod aggregate;
pub mod alias;
pub mod args;
pub mod config;
pub mod diagnostic;
pub mod export;
pub mod hooks;
mod lookup;
pub mod model;
pub mod pk;
mod resolve;
pub mod schema;
pub mod sink;
pub mod validate;

// =============================================================================
// Root-level exports
// =============================================================================

pub use aggregate::AggregateFunc;
pub use args::{Fields, ListArgs, QueryArgs, Sort};
pub use config::{ConfigError, QueryConfig, ResolutionMode};
pub use diagnostic::Diagnostic;
pub use export::CsvExport;
pub use hooks::{BulkOp, HookContext, ModelHooks, NoHooks};
pub use model::{BaseModel, CountMode, ModelContext, Resolved};
pub use schema::{
    Column, Junction, MetadataProvider, Relation, RelationKind, SchemaRegistry, SchemaSnapshot,
    StaticMetadata, Table, TableMeta,
};
pub use sink::{Link, Record, RecordBatch, SinkReport, WriteSink};

/// Result type for basemodel operations
pub use basemodel_core::Result;

/// Dialect tag and column kinds
pub use basemodel_types::{ColumnType, Dialect};

/// Error types
pub mod error {
    pub use basemodel_core::error::BaseModelError;
}

// =============================================================================
// Core module - shared functionality
// =============================================================================

/// Values, SQL fragments, statement builders and the driver traits.
///
/// Most callers only need [`Value`](core::Value) and [`Row`](core::Row);
/// the builders are exposed for drivers and for composing raw statements.
pub mod core {
    pub use basemodel_core::{
        Connection, DeleteQuery, Driver, ExecuteOutcome, InsertQuery, OrderBy, Returning, Row,
        SQL, SQLChunk, SelectQuery, Token, Transaction, UpdateQuery, Value, union_all,
    };

    /// The `where` grammar and condition objects
    pub use basemodel_core::filter;
}

// =============================================================================
// Drivers
// =============================================================================

/// SQLite driver backed by rusqlite.
#[cfg(feature = "rusqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "rusqlite")))]
pub mod sqlite {
    pub use basemodel_sqlite::{SQLiteTransactionType, SqliteDriver, SqliteTransaction};
}

/// PostgreSQL driver backed by tokio-postgres.
#[cfg(feature = "tokio-postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-postgres")))]
pub mod postgres {
    pub use basemodel_postgres::{PgDriver, PgTransaction, PostgresTransactionType};
}
