//! PostgreSQL driver for basemodel.
//!
//! Implements the [`Driver`](basemodel_core::Driver) traits over a
//! [`tokio_postgres::Client`]. A transaction takes exclusive ownership of the
//! client until it ends.

#[cfg(feature = "tokio-postgres")]
mod connection;

#[cfg(feature = "tokio-postgres")]
pub use connection::{PgDriver, PgTransaction};

/// PostgreSQL transaction isolation levels
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostgresTransactionType {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl PostgresTransactionType {
    pub(crate) const fn begin_statement(self) -> &'static str {
        match self {
            PostgresTransactionType::ReadUncommitted => {
                "BEGIN ISOLATION LEVEL READ UNCOMMITTED"
            }
            PostgresTransactionType::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
            PostgresTransactionType::RepeatableRead => "BEGIN ISOLATION LEVEL REPEATABLE READ",
            PostgresTransactionType::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
        }
    }
}
