//! Error types for the persistence core.
//!
//! Every storage operation surfaces one of four kinds:
//! - `Connection`: a backend session could not be acquired or bound
//! - `Query`: the backend rejected a statement or directory operation
//! - `Malformed`: a stored value could not be coerced to its domain shape
//! - `NotFound`: a point read addressed an absent row/entry
//!
//! None of these are retried here; retry policy belongs to callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Cannot acquire or bind a backend session.
    #[error("connection failure: {0}")]
    Connection(String),

    /// The backend rejected a query, command or directory operation.
    #[error("query failure: {0}")]
    Query(String),

    /// A stored or received value does not match the expected domain shape.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// A read by identity addressed a row/entry that does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match e {
            E::Io(_)
            | E::Tls(_)
            | E::PoolTimedOut
            | E::PoolClosed
            | E::WorkerCrashed
            | E::Configuration(_) => StoreError::Connection(e.to_string()),
            E::RowNotFound => StoreError::NotFound(e.to_string()),
            E::ColumnDecode { .. } | E::Decode(_) | E::TypeNotFound { .. } | E::ColumnNotFound(_) => {
                StoreError::Malformed(e.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

impl From<oracle::Error> for StoreError {
    // Acquisition-phase failures are mapped to Connection at the call site;
    // everything else reaching this conversion is a backend rejection.
    fn from(e: oracle::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}
