//! The engine boundary.
//!
//! A [`Connection`] executes raw statements against the single database
//! handle. It offers no concurrency guarantees of its own: the engine only
//! stays consistent when writers are serialized, which is the job of the
//! [`transaction`](crate::transaction) module.
//!
//! Parameters are bound positionally (`?` placeholders) and both parameters
//! and result cells are carried as [`serde_json::Value`].

mod error;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{ConnectionError, ConnectionResult};
pub use sqlite::SqliteConnection;

/// A result row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Rows inserted, updated or deleted by the statement.
    pub changes: u64,
    /// Rowid of the most recent successful insert on the connection.
    pub last_insert_rowid: i64,
}

/// Statement execution against one embedded database handle.
///
/// Implementations classify engine failures into [`ConnectionError`]
/// variants; busy and locked conditions must surface as
/// [`ConnectionError::Busy`] or [`ConnectionError::Locked`] so that the
/// runner can retry them.
pub trait Connection: Send + Sync {
    /// Run a statement that takes no parameters and returns no rows
    /// (`SAVEPOINT`, `RELEASE`, `ROLLBACK TO`, `PRAGMA`).
    fn exec_command(&self, sql: &str) -> ConnectionResult<()>;

    /// Run a write statement with positional parameters.
    fn execute(&self, sql: &str, params: &[Value]) -> ConnectionResult<WriteResult>;

    /// Run a query and return its first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> ConnectionResult<Option<Row>>;

    /// Run a query and return every row.
    fn query_all(&self, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>>;
}
