//! Driver abstraction.
//!
//! Executors never see a concrete database client: they run [`SQL`] through a
//! [`Connection`], which is either the driver itself or an open
//! [`Transaction`]. Everything is object safe so one executor can hold a
//! `dyn Driver` chosen at runtime.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::sql::SQL;
use crate::value::Row;
use async_trait::async_trait;

/// What a write statement reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub rows_affected: u64,
    /// Generated key of the last inserted row, where the driver exposes one
    pub last_insert_id: Option<i64>,
}

/// Something that can run statements.
#[async_trait]
pub trait Connection: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Runs a statement and returns every row, keyed by result column name.
    async fn query(&self, sql: &SQL) -> Result<Vec<Row>>;

    /// Runs a statement that returns no rows.
    async fn execute(&self, sql: &SQL) -> Result<ExecuteOutcome>;

    /// First row of `query`, if any.
    async fn query_one(&self, sql: &SQL) -> Result<Option<Row>> {
        Ok(self.query(sql).await?.into_iter().next())
    }
}

/// A connection that can open transactions.
#[async_trait]
pub trait Driver: Connection {
    /// Starts a transaction. The transaction holds the underlying connection
    /// exclusively until it is committed, rolled back or dropped; dropping it
    /// without committing rolls back.
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>>;
}

#[async_trait]
pub trait Transaction: Connection {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
