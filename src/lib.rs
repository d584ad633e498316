//! bunely - serialized nested transactions over one embedded connection
//!
//! SQLite allows a single writer at a time. This crate lets many
//! concurrent callers share one connection anyway: every top-level
//! transaction waits its turn in a FIFO queue, nested transactions are
//! named savepoints, and busy/locked failures are retried with linear
//! backoff.
//!
//! # Example
//!
//! ```no_run
//! use bunely::db::Bunely;
//! use bunely::sql::Executor;
//! use bunely::transaction::{TransactionError, TransactionOptions};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), TransactionError> {
//! let db = Bunely::open("./app.db")?;
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).await?;
//!
//! let options = TransactionOptions::new().tries(3).backoff_ms(10);
//! db.transaction_with(options, |tx| async move {
//!     tx.execute("INSERT INTO users (name) VALUES (?)", &[json!("alice")])?;
//!     tx.nested(|inner| async move {
//!         inner.execute("UPDATE users SET name = ? WHERE id = 1", &[json!("bob")])?;
//!         Ok(())
//!     })
//!     .await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod db;
pub mod sql;
pub mod transaction;

pub use connection::{Connection, ConnectionError, Row, SqliteConnection, WriteResult};
pub use db::{Bunely, BunelyConfig};
pub use sql::Executor;
pub use transaction::{TransactionError, TransactionOptions, TransactionResult, TransactionRunner, Tx};
