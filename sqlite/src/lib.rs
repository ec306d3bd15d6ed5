//! SQLite driver for basemodel.
//!
//! Wraps a [`rusqlite::Connection`] behind the async
//! [`Driver`](basemodel_core::Driver) traits. rusqlite is synchronous, so each
//! statement runs to completion while holding the connection; a transaction
//! additionally holds a gate that keeps other callers out until it ends.

#[cfg(feature = "rusqlite")]
mod connection;
#[cfg(feature = "rusqlite")]
mod transaction;

#[cfg(feature = "rusqlite")]
pub use connection::SqliteDriver;
#[cfg(feature = "rusqlite")]
pub use transaction::SqliteTransaction;

/// SQLite transaction types
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SQLiteTransactionType {
    #[default]
    /// A deferred transaction is the default - it does not acquire locks until needed
    Deferred,
    /// An immediate transaction acquires a RESERVED lock immediately
    Immediate,
    /// An exclusive transaction acquires an EXCLUSIVE lock immediately
    Exclusive,
}

impl SQLiteTransactionType {
    pub(crate) const fn begin_statement(self) -> &'static str {
        match self {
            SQLiteTransactionType::Deferred => "BEGIN DEFERRED",
            SQLiteTransactionType::Immediate => "BEGIN IMMEDIATE",
            SQLiteTransactionType::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}
