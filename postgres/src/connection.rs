use crate::PostgresTransactionType;
use async_trait::async_trait;
use basemodel_core::row::row_from_postgres;
use basemodel_core::{
    BaseModelError, Connection, Dialect, Driver, ExecuteOutcome, Result, Row, SQL, Transaction,
};
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::Client;
use tokio_postgres::types::ToSql;

/// A tokio-postgres client shared behind an async mutex.
#[derive(Clone)]
pub struct PgDriver {
    client: Arc<Mutex<Client>>,
    transaction_type: PostgresTransactionType,
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("transaction_type", &self.transaction_type)
            .finish_non_exhaustive()
    }
}

impl PgDriver {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            transaction_type: PostgresTransactionType::default(),
        }
    }

    /// Connects without TLS and drives the connection on a spawned task.
    pub async fn connect(config: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(config, tokio_postgres::NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(%error, "postgres connection closed");
            }
        });
        Ok(Self::new(client))
    }

    pub fn with_transaction_type(mut self, transaction_type: PostgresTransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Runs several `;`-separated statements without parameters.
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.client.lock().await.batch_execute(sql).await?;
        Ok(())
    }
}

async fn run_query(client: &Client, sql: &SQL) -> Result<Vec<Row>> {
    let (text, params) = sql.build(Dialect::PostgreSQL);
    basemodel_core::basemodel_trace_query!(&text, params.len());

    let param_refs: SmallVec<[&(dyn ToSql + Sync); 8]> = params
        .iter()
        .map(|&p| p as &(dyn ToSql + Sync))
        .collect();
    let rows = client.query(&text, &param_refs[..]).await?;
    rows.iter().map(row_from_postgres).collect()
}

async fn run_execute(client: &Client, sql: &SQL) -> Result<ExecuteOutcome> {
    let (text, params) = sql.build(Dialect::PostgreSQL);
    basemodel_core::basemodel_trace_query!(&text, params.len());

    let param_refs: SmallVec<[&(dyn ToSql + Sync); 8]> = params
        .iter()
        .map(|&p| p as &(dyn ToSql + Sync))
        .collect();
    let rows_affected = client.execute(&text, &param_refs[..]).await?;
    Ok(ExecuteOutcome {
        rows_affected,
        last_insert_id: None,
    })
}

#[async_trait]
impl Connection for PgDriver {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    async fn query(&self, sql: &SQL) -> Result<Vec<Row>> {
        let client = self.client.lock().await;
        run_query(&client, sql).await
    }

    async fn execute(&self, sql: &SQL) -> Result<ExecuteOutcome> {
        let client = self.client.lock().await;
        run_execute(&client, sql).await
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        let client = self.client.clone().lock_owned().await;
        client
            .batch_execute(self.transaction_type.begin_statement())
            .await?;
        basemodel_core::basemodel_trace_tx!("begin", "postgres.tokio");
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }
}

/// An open PostgreSQL transaction.
///
/// Dropping it without committing issues a ROLLBACK on a spawned task.
pub struct PgTransaction {
    client: Option<OwnedMutexGuard<Client>>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| BaseModelError::Transaction("transaction already finished".into()))
    }

    async fn finish(&mut self, statement: &str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| BaseModelError::Transaction("transaction already finished".into()))?;
        client
            .batch_execute(statement)
            .await
            .map_err(|e| BaseModelError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl Connection for PgTransaction {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    async fn query(&self, sql: &SQL) -> Result<Vec<Row>> {
        run_query(self.client()?, sql).await
    }

    async fn execute(&self, sql: &SQL) -> Result<ExecuteOutcome> {
        run_execute(self.client()?, sql).await
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        basemodel_core::basemodel_trace_tx!("commit", "postgres.tokio");
        self.finish("COMMIT").await
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        basemodel_core::basemodel_trace_tx!("rollback", "postgres.tokio");
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        basemodel_core::basemodel_trace_tx!("rollback", "postgres.tokio");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = client.batch_execute("ROLLBACK").await {
                        tracing::error!(%error, "rollback of dropped transaction failed");
                    }
                });
            }
            Err(_) => tracing::error!("transaction dropped outside a runtime; not rolled back"),
        }
    }
}
