//! Table models.
//!
//! A [`BaseModel`] binds one table of one [`SchemaSnapshot`] to a driver,
//! the query configuration and the table's hooks. Models are cheap to build
//! and are meant to be built per request from a [`ModelContext`], so a
//! schema refresh never changes the snapshot an operation is using.
//!
//! Every operation takes an optional connection. When given, statements run
//! on it (typically an open transaction); otherwise they run on the driver,
//! and operations that need atomicity open their own transaction.

mod read;
mod relations;
mod write;

pub use read::CountMode;

use crate::args::ListArgs;
use crate::config::QueryConfig;
use crate::diagnostic::Diagnostic;
use crate::hooks::{HookContext, ModelHooks, NoHooks};
use crate::lookup;
use crate::resolve::{Projection, TableResolver, projection};
use crate::schema::{SchemaRegistry, SchemaSnapshot, Table};
use basemodel_core::{Connection, Dialect, Driver, Result, Row, SQL, SelectQuery, Transaction};
use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

// ============================================================================
// ModelContext
// ============================================================================

/// Shared state models are built from.
pub struct ModelContext {
    driver: Arc<dyn Driver>,
    registry: Arc<SchemaRegistry>,
    config: Arc<QueryConfig>,
    hooks: HashMap<String, Arc<dyn ModelHooks>>,
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("dialect", &self.driver.dialect())
            .field("registry", &self.registry)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelContext {
    pub fn new(driver: Arc<dyn Driver>, registry: Arc<SchemaRegistry>, config: QueryConfig) -> Self {
        Self {
            driver,
            registry,
            config: Arc::new(config),
            hooks: HashMap::new(),
        }
    }

    /// Registers hooks for the table named (physically or by alias) `table`.
    pub fn with_hooks(mut self, table: impl Into<String>, hooks: Arc<dyn ModelHooks>) -> Self {
        self.hooks.insert(table.into(), hooks);
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Model of `table` on the current snapshot.
    pub fn model(&self, table: &str) -> Result<BaseModel> {
        let snapshot = self.registry.snapshot();
        let handle = snapshot.require(table)?.clone();
        let hooks = self
            .hooks
            .get(handle.name())
            .or_else(|| self.hooks.get(handle.alias()))
            .cloned()
            .unwrap_or_else(|| Arc::new(NoHooks));
        Ok(BaseModel {
            driver: self.driver.clone(),
            snapshot,
            table: handle,
            config: self.config.clone(),
            hooks,
        })
    }
}

// ============================================================================
// BaseModel
// ============================================================================

/// Operations on one table.
#[derive(Clone)]
pub struct BaseModel {
    driver: Arc<dyn Driver>,
    snapshot: Arc<SchemaSnapshot>,
    table: Arc<Table>,
    config: Arc<QueryConfig>,
    hooks: Arc<dyn ModelHooks>,
}

impl std::fmt::Debug for BaseModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseModel")
            .field("table", &self.table.name())
            .field("version", &self.snapshot.version())
            .finish_non_exhaustive()
    }
}

impl BaseModel {
    #[inline]
    pub fn table(&self) -> &Table {
        &self.table
    }

    #[inline]
    pub fn snapshot(&self) -> &Arc<SchemaSnapshot> {
        &self.snapshot
    }

    #[inline]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    /// `tx` when given, the driver otherwise.
    pub(crate) fn conn<'a>(&'a self, tx: Option<&'a dyn Connection>) -> &'a dyn Connection {
        match tx {
            Some(conn) => conn,
            None => &*self.driver as &dyn Connection,
        }
    }

    pub(crate) fn cx<'a>(&'a self, conn: &'a dyn Connection) -> Ctx<'a> {
        Ctx {
            snapshot: &self.snapshot,
            config: &self.config,
            conn,
        }
    }

    pub(crate) fn hook_context<'a>(&'a self, conn: &'a dyn Connection) -> HookContext<'a> {
        HookContext {
            table: self.table.name(),
            conn,
        }
    }

    /// Transaction scope on `tx`, or on a new transaction of the driver.
    pub(crate) async fn scope<'a>(&'a self, tx: Option<&'a dyn Connection>) -> Result<Scope<'a>> {
        match tx {
            Some(conn) => Ok(Scope::Borrowed(conn)),
            None => Ok(Scope::Owned(self.driver.begin().await?)),
        }
    }

    /// Model of another table on the same snapshot, without hooks.
    pub(crate) fn sibling(&self, table: &str) -> Result<BaseModel> {
        Ok(BaseModel {
            driver: self.driver.clone(),
            snapshot: self.snapshot.clone(),
            table: self.snapshot.require(table)?.clone(),
            config: self.config.clone(),
            hooks: Arc::new(NoHooks),
        })
    }

    /// Logs a failed operation before handing the error back.
    pub(crate) async fn traced<T>(
        &self,
        op: &'static str,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        operation.await.inspect_err(|error| {
            tracing::error!(table = self.table.name(), op, %error, "basemodel.operation.failed");
        })
    }
}

// ============================================================================
// Transaction scope
// ============================================================================

/// Connection an atomic operation runs on.
pub(crate) enum Scope<'a> {
    /// Caller's connection; the caller commits
    Borrowed(&'a dyn Connection),
    /// Transaction opened for this operation
    Owned(Box<dyn Transaction + 'a>),
}

impl Scope<'_> {
    pub fn conn(&self) -> &dyn Connection {
        match self {
            Scope::Borrowed(conn) => *conn,
            Scope::Owned(tx) => &**tx,
        }
    }

    /// Commits on success and rolls back on failure, returning `result`.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match (self, result) {
            (Scope::Borrowed(_), result) => result,
            (Scope::Owned(tx), Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            (Scope::Owned(tx), Err(error)) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "basemodel.rollback.failed");
                }
                Err(error)
            }
        }
    }
}

// ============================================================================
// Read context
// ============================================================================

/// Rows plus the relation targets skipped while resolving them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved<T> {
    pub data: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Resolved<T> {
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> Deref for Resolved<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// What read helpers need: the snapshot, limits and a connection.
#[derive(Clone, Copy)]
pub(crate) struct Ctx<'a> {
    pub snapshot: &'a SchemaSnapshot,
    pub config: &'a QueryConfig,
    pub conn: &'a dyn Connection,
}

impl<'a> Ctx<'a> {
    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    pub fn resolver(&self, table: &'a Table) -> TableResolver<'a> {
        TableResolver::new(self.snapshot, table, self.dialect())
    }

    /// SELECT on `table` for `args`, with `scope` ANDed into its WHERE.
    ///
    /// Without an explicit sort, union branches order by the primary key so
    /// each parent's page is stable; MSSQL statements do the same because the
    /// dialect cannot paginate unordered. Elsewhere no order is implied.
    pub fn select(
        &self,
        table: &'a Table,
        args: &ListArgs,
        scope: Option<SQL>,
        union_branch: bool,
    ) -> Result<(SelectQuery, Projection<'a>)> {
        let dialect = self.dialect();
        let mut fields = args.fields.clone();
        for key in table.primary_keys() {
            fields.ensure(table, &key.name);
        }
        let mut projection = projection(self.snapshot, table, &fields, table.name(), dialect)?;
        let mut resolver = self.resolver(table);

        let mut query = SelectQuery::from_table(table.name())
            .columns(std::mem::take(&mut projection.columns));
        if let Some(scope) = scope {
            query.and_filter(scope);
        }
        if let Some(filter) = args.filters() {
            query.and_filter(filter.to_sql(&mut resolver, dialect)?);
        }
        if let Some(having) = &args.having {
            query = query.having(having.to_sql(&mut resolver, dialect)?);
        }

        let mut order = resolver.order(&args.sort)?;
        if order.is_empty() && (union_branch || dialect == Dialect::MsSql) {
            order = resolver.default_order();
        }
        for (expr, direction) in order {
            query = query.order_by(expr, direction);
        }
        Ok((query.limit(args.limit).offset(args.offset), projection))
    }

    /// Runs `sql`, then attaches the projection's lookups.
    pub async fn fetch(&self, sql: &SQL, projection: &Projection<'_>) -> Result<Vec<Row>> {
        let mut rows = self.conn.query(sql).await?;
        lookup::attach(self, &mut rows, &projection.lookups).await?;
        projection.strip(&mut rows);
        Ok(rows)
    }

    pub async fn list(
        &self,
        table: &'a Table,
        args: &ListArgs,
        scope: Option<SQL>,
    ) -> Result<Vec<Row>> {
        let (query, projection) = self.select(table, args, scope, false)?;
        self.fetch(&query.to_sql(self.dialect()), &projection).await
    }
}
