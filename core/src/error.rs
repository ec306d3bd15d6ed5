use thiserror::Error;

#[derive(Debug, Error)]
pub enum BaseModelError {
    /// Error executing a statement
    #[error("Execution error: {0}")]
    Execution(String),

    /// Error preparing a statement
    #[error("Prepare error: {0}")]
    Prepare(String),

    /// No rows returned when at least one was expected
    #[error("No rows found")]
    NotFound,

    /// Error beginning, committing or rolling back a transaction
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Error mapping a driver row into a [`Row`](crate::Row)
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Error in statement shape (empty insert, missing primary key, ...)
    #[error("Statement error: {0}")]
    Statement(String),

    /// Query construction failed: filter grammar, unknown column, bad sort key
    #[error("{0}")]
    Query(String),

    /// Error converting parameters
    #[error("Parameter conversion error: {0}")]
    Parameter(String),

    /// A column validator rejected a value; the message is user-facing
    #[error("{message}")]
    Validation { column: String, message: String },

    /// A before/after hook failed
    #[error("Hook error: {0}")]
    Hook(String),

    /// Schema metadata is inconsistent or a table/relation is missing
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error
    #[error("Database error: {0}")]
    Other(String),

    /// Rusqlite specific errors
    #[cfg(feature = "rusqlite")]
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    /// tokio-postgres specific errors
    #[cfg(feature = "tokio-postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl BaseModelError {
    /// Builds a query-construction error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Returns `true` for errors raised by a column validator.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<serde_json::Error> for BaseModelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parameter(value.to_string())
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, BaseModelError>;
