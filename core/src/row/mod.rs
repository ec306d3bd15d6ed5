//! Driver value conversions.
//!
//! [`Value`](crate::Value) binds into and decodes out of each supported
//! driver. Structured values (JSON cells, nested rows) are bound as JSON text
//! since no dialect stores them natively everywhere.

#[cfg(feature = "tokio-postgres")]
mod postgres;
#[cfg(feature = "rusqlite")]
mod rusqlite;

#[cfg(feature = "tokio-postgres")]
pub use self::postgres::row_from_postgres;
#[cfg(feature = "rusqlite")]
pub use self::rusqlite::row_from_rusqlite;
