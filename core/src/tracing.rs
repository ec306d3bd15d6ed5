//! Tracing utilities for statement and transaction observability.
//!
//! The macros expand to `tracing` events through a re-export so callers do not
//! need their own `tracing` dependency.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// basemodel_trace_query!(&sql_str, params.len());
/// ```
#[macro_export]
macro_rules! basemodel_trace_query {
    ($sql:expr, $param_count:expr) => {
        $crate::__private::tracing::debug!(
            sql = %$sql,
            params = $param_count,
            "basemodel.query"
        );
    };
}

/// Emit an info-level tracing event for transaction lifecycle (begin, commit, rollback).
///
/// ```ignore
/// basemodel_trace_tx!("begin", "sqlite.rusqlite");
/// basemodel_trace_tx!("rollback", "postgres.tokio");
/// ```
#[macro_export]
macro_rules! basemodel_trace_tx {
    ($event:literal, $driver:literal) => {
        $crate::__private::tracing::info!(
            event = $event,
            driver = $driver,
            "basemodel.transaction"
        );
    };
}
