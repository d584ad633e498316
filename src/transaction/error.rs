//! Transaction error types.

use thiserror::Error;

use crate::connection::ConnectionError;
use crate::sql::SqlError;
use crate::transaction::frame::FrameState;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    /// Error raised by the connection, passed through unchanged.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A statement builder rejected its input.
    #[error("sql error: {0}")]
    Sql(#[from] SqlError),

    /// The handle's savepoint was already released or rolled back.
    #[error("savepoint {savepoint} is already {state}")]
    Finalized {
        savepoint: String,
        state: FrameState,
    },

    /// A second child frame was requested while another child of the same
    /// frame is still open.
    #[error("savepoint {savepoint} already has an open nested transaction")]
    ChildActive { savepoint: String },

    /// A transaction body re-entered the queue it is holding.
    #[error("this task already holds the transaction queue; use the transaction handle instead")]
    Reentrant,

    /// The retry loop ended without a result.
    #[error("transaction retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Transaction options out of range.
    #[error("invalid transaction options: {0}")]
    InvalidOptions(String),

    /// The transaction body gave up on its own.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl TransactionError {
    /// Check if this error is busy/locked contention, the only retryable class.
    pub fn is_contention(&self) -> bool {
        match self {
            TransactionError::Connection(e) => e.is_contention(),
            _ => false,
        }
    }

    /// Create an abort error with the given reason.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }
}
