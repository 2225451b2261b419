//! Error types for sqlspy

use thiserror::Error;

/// Result type alias for sqlspy operations
pub type SpyResult<T> = Result<T, SpyError>;

/// Errors surfaced by spied clients and configuration loading.
///
/// Database errors are handed back to the caller exactly as the wrapped
/// client produced them; the logging side never creates one of those.
#[derive(Debug, Error)]
pub enum SpyError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// More rows than the caller asked for
    #[error("Too many rows: expected {expected}, got {got}")]
    TooManyRows { expected: usize, got: usize },

    /// Invalid configuration value
    #[error("Config error for '{key}': {message}")]
    Config { key: String, message: String },

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SpyError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a too-many-rows error
    pub fn too_many_rows(expected: usize, got: usize) -> Self {
        Self::TooManyRows { expected, got }
    }

    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error came from the database
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for SpyError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
