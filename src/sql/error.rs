//! Statement builder errors.

use thiserror::Error;

/// Result type for statement building.
pub type SqlResult<T> = Result<T, SqlError>;

/// Statement builder errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("no values to write into table {0:?}")]
    EmptyValues(String),
}
