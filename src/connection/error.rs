//! Connection error types.
//!
//! Every failure coming out of the engine is classified here, at the
//! boundary. Retry decisions further up only look at the variant.

use thiserror::Error;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors raised by a [`Connection`](super::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Another writer holds the engine's write lock.
    #[error("database is busy: {0}")]
    Busy(String),

    /// A table or the database is locked by a conflicting statement.
    #[error("database is locked: {0}")]
    Locked(String),

    /// A UNIQUE, NOT NULL, CHECK or FOREIGN KEY constraint failed.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Syntax errors and any other statement failure.
    #[error("statement error: {0}")]
    Statement(String),

    /// A value could not be converted to or from the engine's storage class.
    #[error("type mismatch: {0}")]
    Type(String),

    /// The database could not be opened.
    #[error("cannot open database: {0}")]
    Open(String),
}

impl ConnectionError {
    /// Whether this error signals write contention and may succeed on retry.
    pub fn is_contention(&self) -> bool {
        matches!(self, ConnectionError::Busy(_) | ConnectionError::Locked(_))
    }
}
