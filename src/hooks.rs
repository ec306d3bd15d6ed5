//! Per-table operation hooks.
//!
//! Every method has a no-op default, so an implementation overrides only
//! the points it cares about. A `before_*` error aborts the operation
//! before any statement runs; `error_*` hooks observe failures and cannot
//! change them.

use async_trait::async_trait;
use basemodel_core::{BaseModelError, Connection, Result, Row};

/// Bulk operation kind passed to the bulk hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    Insert,
    Update,
    Delete,
}

/// What a hook sees besides the operation payload.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    /// Physical table name
    pub table: &'a str,
    /// Connection the operation runs on; the open transaction when there is one
    pub conn: &'a dyn Connection,
}

impl std::fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("table", &self.table)
            .field("dialect", &self.conn.dialect())
            .finish()
    }
}

#[async_trait]
pub trait ModelHooks: Send + Sync {
    /// May rewrite the physical row about to be inserted.
    async fn before_insert(&self, _ctx: &HookContext<'_>, _data: &mut Row) -> Result<()> {
        Ok(())
    }

    async fn after_insert(&self, _ctx: &HookContext<'_>, _row: &Row) -> Result<()> {
        Ok(())
    }

    async fn error_insert(&self, _ctx: &HookContext<'_>, _error: &BaseModelError, _data: &Row) {}

    async fn before_update(&self, _ctx: &HookContext<'_>, _id: &str, _data: &mut Row) -> Result<()> {
        Ok(())
    }

    async fn after_update(&self, _ctx: &HookContext<'_>, _row: &Row) -> Result<()> {
        Ok(())
    }

    async fn error_update(&self, _ctx: &HookContext<'_>, _error: &BaseModelError, _data: &Row) {}

    async fn before_delete(&self, _ctx: &HookContext<'_>, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn after_delete(&self, _ctx: &HookContext<'_>, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn error_delete(&self, _ctx: &HookContext<'_>, _error: &BaseModelError, _id: &str) {}

    async fn before_bulk(&self, _ctx: &HookContext<'_>, _op: BulkOp, _rows: &mut Vec<Row>) -> Result<()> {
        Ok(())
    }

    /// `affected` is the number of rows written or deleted.
    async fn after_bulk(&self, _ctx: &HookContext<'_>, _op: BulkOp, _affected: u64) -> Result<()> {
        Ok(())
    }

    async fn error_bulk(&self, _ctx: &HookContext<'_>, _op: BulkOp, _error: &BaseModelError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ModelHooks for NoHooks {}
