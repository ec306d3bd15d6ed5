use crate::SQLiteTransactionType;
use crate::transaction::SqliteTransaction;
use async_trait::async_trait;
use basemodel_core::row::row_from_rusqlite;
use basemodel_core::{
    BaseModelError, Connection, Dialect, Driver, ExecuteOutcome, Result, Row, SQL, Transaction,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A single rusqlite connection usable from async code.
pub struct SqliteDriver {
    conn: Mutex<::rusqlite::Connection>,
    /// Held for the lifetime of a transaction and around every statement
    /// outside one, so statements never interleave with an open transaction.
    gate: tokio::sync::Mutex<()>,
    transaction_type: SQLiteTransactionType,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("transaction_type", &self.transaction_type)
            .finish_non_exhaustive()
    }
}

impl SqliteDriver {
    pub fn new(conn: ::rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            gate: tokio::sync::Mutex::new(()),
            transaction_type: SQLiteTransactionType::default(),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = ::rusqlite::Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self::new(conn))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = ::rusqlite::Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self::new(conn))
    }

    /// Sets the locking mode used by [`Driver::begin`].
    pub fn with_transaction_type(mut self, transaction_type: SQLiteTransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Runs several `;`-separated statements without parameters (DDL, pragmas).
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        lock(&self.conn)?.execute_batch(sql)?;
        Ok(())
    }

    pub(crate) async fn begin_transaction(&self) -> Result<SqliteTransaction<'_>> {
        let gate = self.gate.lock().await;
        lock(&self.conn)?.execute_batch(self.transaction_type.begin_statement())?;
        basemodel_core::basemodel_trace_tx!("begin", "sqlite.rusqlite");
        Ok(SqliteTransaction::new(gate, &self.conn))
    }
}

pub(crate) fn lock(
    conn: &Mutex<::rusqlite::Connection>,
) -> Result<MutexGuard<'_, ::rusqlite::Connection>> {
    conn.lock()
        .map_err(|_| BaseModelError::Other("sqlite connection mutex poisoned".into()))
}

pub(crate) fn run_query(conn: &::rusqlite::Connection, sql: &SQL) -> Result<Vec<Row>> {
    let (text, params) = sql.build(Dialect::SQLite);
    basemodel_core::basemodel_trace_query!(&text, params.len());

    let mut stmt = conn
        .prepare(&text)
        .map_err(|e| BaseModelError::Prepare(format!("{e}: {text}")))?;
    let mut rows = stmt.query(::rusqlite::params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_from_rusqlite(row)?);
    }
    Ok(out)
}

pub(crate) fn run_execute(conn: &::rusqlite::Connection, sql: &SQL) -> Result<ExecuteOutcome> {
    let (text, params) = sql.build(Dialect::SQLite);
    basemodel_core::basemodel_trace_query!(&text, params.len());

    let mut stmt = conn
        .prepare(&text)
        .map_err(|e| BaseModelError::Prepare(format!("{e}: {text}")))?;
    let affected = stmt
        .execute(::rusqlite::params_from_iter(params.iter()))
        .map_err(|e| BaseModelError::Execution(e.to_string()))?;
    Ok(ExecuteOutcome {
        rows_affected: affected as u64,
        last_insert_id: is_insert(&text).then(|| conn.last_insert_rowid()),
    })
}

// the connection keeps the rowid of its last INSERT across later statements
fn is_insert(text: &str) -> bool {
    text.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

#[async_trait]
impl Connection for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::SQLite
    }

    async fn query(&self, sql: &SQL) -> Result<Vec<Row>> {
        let _gate = self.gate.lock().await;
        run_query(&*lock(&self.conn)?, sql)
    }

    async fn execute(&self, sql: &SQL) -> Result<ExecuteOutcome> {
        let _gate = self.gate.lock().await;
        run_execute(&*lock(&self.conn)?, sql)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(self.begin_transaction().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basemodel_core::{SelectQuery, Value};

    async fn driver() -> SqliteDriver {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        driver
    }

    #[tokio::test]
    async fn runs_statements() {
        let driver = driver().await;
        let insert = SQL::raw("INSERT INTO t (name) VALUES").append(SQL::param("a").parens());
        let outcome = driver.execute(&insert).await.unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let rows = driver
            .query(&SelectQuery::from_table("t").to_sql(Dialect::SQLite))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::from("a"));
    }

    #[tokio::test]
    async fn only_inserts_report_a_rowid() {
        let driver = driver().await;
        let insert = SQL::raw("insert into t (name) values ('a')");
        assert_eq!(driver.execute(&insert).await.unwrap().last_insert_id, Some(1));

        let update = SQL::raw("UPDATE t SET name = 'b'");
        let outcome = driver.execute(&update).await.unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, None);

        let delete = SQL::raw("DELETE FROM t");
        assert_eq!(driver.execute(&delete).await.unwrap().last_insert_id, None);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let driver = driver().await;
        {
            let tx = driver.begin().await.unwrap();
            tx.execute(&SQL::raw("INSERT INTO t (name) VALUES ('x')"))
                .await
                .unwrap();
        }
        let rows = driver.query(&SQL::raw("SELECT * FROM t")).await.unwrap();
        assert!(rows.is_empty());

        let tx = driver.begin().await.unwrap();
        tx.execute(&SQL::raw("INSERT INTO t (name) VALUES ('y')"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        let rows = driver.query(&SQL::raw("SELECT * FROM t")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
