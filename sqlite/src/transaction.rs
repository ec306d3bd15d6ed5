use crate::connection::{lock, run_execute, run_query};
use async_trait::async_trait;
use basemodel_core::{Connection, Dialect, ExecuteOutcome, Result, Row, SQL, Transaction};
use std::sync::Mutex;

/// An open SQLite transaction.
///
/// Rolls back when dropped without [`Transaction::commit`].
pub struct SqliteTransaction<'a> {
    _gate: tokio::sync::MutexGuard<'a, ()>,
    conn: &'a Mutex<::rusqlite::Connection>,
    finished: bool,
}

impl<'a> SqliteTransaction<'a> {
    pub(crate) fn new(
        gate: tokio::sync::MutexGuard<'a, ()>,
        conn: &'a Mutex<::rusqlite::Connection>,
    ) -> Self {
        Self {
            _gate: gate,
            conn,
            finished: false,
        }
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        let result = lock(self.conn)?.execute_batch(statement);
        self.finished = true;
        Ok(result?)
    }
}

#[async_trait]
impl Connection for SqliteTransaction<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    async fn query(&self, sql: &SQL) -> Result<Vec<Row>> {
        run_query(&*lock(self.conn)?, sql)
    }

    async fn execute(&self, sql: &SQL) -> Result<ExecuteOutcome> {
        run_execute(&*lock(self.conn)?, sql)
    }
}

#[async_trait]
impl Transaction for SqliteTransaction<'_> {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        basemodel_core::basemodel_trace_tx!("commit", "sqlite.rusqlite");
        match self.finish("COMMIT") {
            Ok(()) => Ok(()),
            Err(e) => {
                // a failed COMMIT leaves the transaction open
                if let Ok(conn) = lock(self.conn)
                    && !conn.is_autocommit()
                {
                    let _ = conn.execute_batch("ROLLBACK");
                }
                Err(e)
            }
        }
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        basemodel_core::basemodel_trace_tx!("rollback", "sqlite.rusqlite");
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        basemodel_core::basemodel_trace_tx!("rollback", "sqlite.rusqlite");
        if let Ok(conn) = lock(self.conn)
            && !conn.is_autocommit()
        {
            let _ = conn.execute_batch("ROLLBACK");
        }
    }
}
