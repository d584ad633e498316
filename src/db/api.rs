//! Database API - high-level interface for bunely.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::connection::{Connection, Row, SqliteConnection, WriteResult};
use crate::sql;
use crate::transaction::{TransactionOptions, TransactionResult, TransactionRunner, Tx};

/// Database configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BunelyConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Engine busy timeout, applied once with `PRAGMA busy_timeout`.
    pub busy_timeout_ms: Option<u64>,
    /// Default attempts per transaction.
    pub tries: u32,
    /// Default backoff unit between attempts.
    pub backoff_ms: u64,
    /// Default lock mode.
    pub immediate: bool,
}

impl Default for BunelyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bunely.db"),
            busy_timeout_ms: Some(5000),
            tries: 1,
            backoff_ms: 10,
            immediate: true,
        }
    }
}

impl BunelyConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the busy timeout; `None` leaves the engine default alone.
    pub fn busy_timeout_ms(mut self, value: Option<u64>) -> Self {
        self.busy_timeout_ms = value;
        self
    }

    /// Set the default number of attempts.
    pub fn tries(mut self, value: u32) -> Self {
        self.tries = value;
        self
    }

    /// Set the default backoff unit.
    pub fn backoff_ms(mut self, value: u64) -> Self {
        self.backoff_ms = value;
        self
    }

    /// Set the default lock mode.
    pub fn immediate(mut self, value: bool) -> Self {
        self.immediate = value;
        self
    }

    /// Transaction options built from these defaults.
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::new()
            .immediate(self.immediate)
            .tries(self.tries)
            .backoff_ms(self.backoff_ms)
    }
}

/// The main database handle.
///
/// Cheap to clone; clones share one connection and one serialization queue.
#[derive(Clone)]
pub struct Bunely {
    config: BunelyConfig,
    runner: TransactionRunner,
}

impl Bunely {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> TransactionResult<Self> {
        Self::open_with_config(BunelyConfig::new(path.as_ref()))
    }

    /// Open or create a database with custom configuration.
    pub fn open_with_config(config: BunelyConfig) -> TransactionResult<Self> {
        let conn = SqliteConnection::open(&config.path)?;
        Self::with_connection(Arc::new(conn), config)
    }

    /// Create a private in-memory database.
    pub fn in_memory() -> TransactionResult<Self> {
        let config = BunelyConfig::new(":memory:");
        let conn = SqliteConnection::open_in_memory()?;
        Self::with_connection(Arc::new(conn), config)
    }

    /// Build on top of an existing connection.
    pub fn with_connection(conn: Arc<dyn Connection>, config: BunelyConfig) -> TransactionResult<Self> {
        if let Some(ms) = config.busy_timeout_ms {
            conn.exec_command(&format!("PRAGMA busy_timeout={}", ms))?;
            debug!(busy_timeout_ms = ms, "busy timeout configured");
        }
        Ok(Self {
            config,
            runner: TransactionRunner::new(conn),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BunelyConfig {
        &self.config
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the transaction runner.
    pub fn runner(&self) -> &TransactionRunner {
        &self.runner
    }

    /// Run `body` in a transaction using the configured defaults.
    ///
    /// Nest with [`Tx::nested`] rather than calling this again from a body.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> TransactionResult<T>
    where
        F: FnMut(Tx) -> Fut,
        Fut: Future<Output = TransactionResult<T>>,
    {
        self.runner
            .transaction_with(self.config.transaction_options(), body)
            .await
    }

    /// Run `body` in a transaction with explicit options.
    pub async fn transaction_with<F, Fut, T>(
        &self,
        options: TransactionOptions,
        body: F,
    ) -> TransactionResult<T>
    where
        F: FnMut(Tx) -> Fut,
        Fut: Future<Output = TransactionResult<T>>,
    {
        self.runner.transaction_with(options, body).await
    }

    /// Execute a write statement outside any transaction.
    ///
    /// This and the other non-transactional helpers fail with
    /// [`TransactionError::Reentrant`](crate::transaction::TransactionError::Reentrant)
    /// when called from inside a transaction body; use the body's `Tx`.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> TransactionResult<WriteResult> {
        self.runner.execute(sql, params).await
    }

    /// Run a query outside any transaction and return its first row.
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> TransactionResult<Option<Row>> {
        self.runner.query_one(sql, params).await
    }

    /// Run a query outside any transaction and return every row.
    pub async fn query_all(&self, sql: &str, params: &[Value]) -> TransactionResult<Vec<Row>> {
        self.runner.query_all(sql, params).await
    }

    /// Insert one row.
    pub async fn insert(&self, table: &str, values: &Row) -> TransactionResult<WriteResult> {
        let stmt = sql::insert(table, values)?;
        self.execute(&stmt.sql, &stmt.params).await
    }

    /// Update the rows matching every `filter` column.
    pub async fn update(&self, table: &str, set: &Row, filter: &Row) -> TransactionResult<WriteResult> {
        let stmt = sql::update(table, set, filter)?;
        self.execute(&stmt.sql, &stmt.params).await
    }

    /// Delete the rows matching every `filter` column.
    pub async fn delete(&self, table: &str, filter: &Row) -> TransactionResult<WriteResult> {
        let stmt = sql::delete(table, filter)?;
        self.execute(&stmt.sql, &stmt.params).await
    }

    /// Select the rows matching every `filter` column.
    pub async fn select(&self, table: &str, filter: &Row) -> TransactionResult<Vec<Row>> {
        let stmt = sql::select(table, filter)?;
        self.query_all(&stmt.sql, &stmt.params).await
    }

    /// Select the first row matching every `filter` column.
    pub async fn select_one(&self, table: &str, filter: &Row) -> TransactionResult<Option<Row>> {
        let stmt = sql::select(table, filter)?;
        self.query_one(&stmt.sql, &stmt.params).await
    }
}

impl std::fmt::Debug for Bunely {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bunely")
            .field("path", &self.config.path)
            .field("runner", &self.runner)
            .finish()
    }
}
