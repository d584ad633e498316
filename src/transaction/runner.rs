//! Transaction runner - serialized, retrying top-level transactions.
//!
//! The runner is the entry point for transactions. It handles:
//! - Admission through the serialization queue (one body at a time, FIFO)
//! - The outermost savepoint of every attempt
//! - Retrying busy/locked failures with linear backoff
//!
//! Retries happen inside the same queue slot, so a different caller can
//! never slip in between two attempts of one transaction. The backoff
//! sleep holds the slot as well.
//!
//! A body must use its [`Tx`] for statements. Calling back into the runner
//! (a passthrough or another `transaction`) from inside a body fails with
//! [`TransactionError::Reentrant`] instead of waiting on its own slot.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::{Connection, Row, WriteResult};
use crate::transaction::context::Tx;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::names::NameGenerator;
use crate::transaction::options::TransactionOptions;
use crate::transaction::queue::SerializationQueue;

/// Runs transaction bodies against one shared connection.
///
/// Cheap to clone; clones share the connection, name generator and queue.
#[derive(Clone)]
pub struct TransactionRunner {
    inner: Arc<TransactionRunnerInner>,
}

struct TransactionRunnerInner {
    conn: Arc<dyn Connection>,
    names: Arc<NameGenerator>,
    queue: SerializationQueue,
}

impl TransactionRunner {
    /// Create a runner with its own name generator.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self::with_names(conn, Arc::new(NameGenerator::new()))
    }

    /// Create a runner that draws savepoint names from `names`.
    pub fn with_names(conn: Arc<dyn Connection>, names: Arc<NameGenerator>) -> Self {
        Self {
            inner: Arc::new(TransactionRunnerInner {
                conn,
                names,
                queue: SerializationQueue::new(),
            }),
        }
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.conn
    }

    pub fn queue(&self) -> &SerializationQueue {
        &self.inner.queue
    }

    /// Run `body` in a transaction with the default options (one attempt).
    pub async fn transaction<F, Fut, T>(&self, body: F) -> TransactionResult<T>
    where
        F: FnMut(Tx) -> Fut,
        Fut: Future<Output = TransactionResult<T>>,
    {
        self.transaction_with(TransactionOptions::default(), body).await
    }

    /// Run `body` in a transaction, retrying contention failures.
    ///
    /// Each attempt opens a fresh outermost savepoint and hands the body a
    /// new [`Tx`]. If the body succeeds the savepoint is released and the
    /// value returned. If it fails the savepoint is rolled back and
    /// released; a busy/locked error is retried after
    /// `backoff * (attempt + 1)` while attempts remain, anything else is
    /// returned as is.
    ///
    /// Starting a transaction from inside a body of this runner fails with
    /// [`TransactionError::Reentrant`]; use [`Tx::nested`] there.
    pub async fn transaction_with<F, Fut, T>(
        &self,
        options: TransactionOptions,
        mut body: F,
    ) -> TransactionResult<T>
    where
        F: FnMut(Tx) -> Fut,
        Fut: Future<Output = TransactionResult<T>>,
    {
        options.validate()?;
        self.ensure_not_reentrant()?;
        let _permit = self.inner.queue.acquire().await;
        self.inner
            .queue
            .holding(self.attempts(&options, &mut body))
            .await
    }

    async fn attempts<F, Fut, T>(&self, options: &TransactionOptions, body: &mut F) -> TransactionResult<T>
    where
        F: FnMut(Tx) -> Fut,
        Fut: Future<Output = TransactionResult<T>>,
    {
        for attempt in 0..options.tries {
            let outcome = match Tx::begin(Arc::clone(&self.inner.conn), Arc::clone(&self.inner.names)) {
                Ok((tx, guard)) => {
                    debug!(
                        savepoint = %tx.savepoint(),
                        attempt,
                        lock_mode = %options.lock_mode,
                        "transaction attempt started"
                    );
                    let outcome = body(tx).await;
                    guard.settle(outcome)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_contention() && attempt + 1 < options.tries => {
                    let delay = options.delay_after(attempt);
                    warn!(
                        attempt = attempt + 1,
                        tries = options.tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transaction hit contention; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(TransactionError::RetriesExhausted {
            attempts: options.tries,
        })
    }

    fn ensure_not_reentrant(&self) -> TransactionResult<()> {
        if self.inner.queue.held_by_current_task() {
            return Err(TransactionError::Reentrant);
        }
        Ok(())
    }

    /// Run a write statement outside any transaction, in queue order.
    ///
    /// Fails with [`TransactionError::Reentrant`] when called from inside a
    /// transaction body of this runner.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> TransactionResult<WriteResult> {
        self.ensure_not_reentrant()?;
        let conn = &self.inner.conn;
        self.inner
            .queue
            .run(|| async move { conn.execute(sql, params).map_err(TransactionError::from) })
            .await
    }

    /// Run a query outside any transaction and return its first row.
    ///
    /// Same re-entrancy rule as [`execute`](TransactionRunner::execute).
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> TransactionResult<Option<Row>> {
        self.ensure_not_reentrant()?;
        let conn = &self.inner.conn;
        self.inner
            .queue
            .run(|| async move { conn.query_one(sql, params).map_err(TransactionError::from) })
            .await
    }

    /// Run a query outside any transaction and return every row.
    ///
    /// Same re-entrancy rule as [`execute`](TransactionRunner::execute).
    pub async fn query_all(&self, sql: &str, params: &[Value]) -> TransactionResult<Vec<Row>> {
        self.ensure_not_reentrant()?;
        let conn = &self.inner.conn;
        self.inner
            .queue
            .run(|| async move { conn.query_all(sql, params).map_err(TransactionError::from) })
            .await
    }
}

impl std::fmt::Debug for TransactionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRunner")
            .field("busy", &self.inner.queue.is_held())
            .field("waiting", &self.inner.queue.waiting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::Instant;

    use crate::connection::testing::RecordingConnection;
    use crate::connection::{ConnectionError, SqliteConnection};
    use crate::sql::Executor;

    fn setup() -> (Arc<RecordingConnection>, TransactionRunner) {
        let conn = RecordingConnection::new();
        let runner = TransactionRunner::new(conn.clone());
        (conn, runner)
    }

    fn busy() -> TransactionError {
        ConnectionError::Busy("database is busy".into()).into()
    }

    #[tokio::test]
    async fn test_commit() {
        let (conn, runner) = setup();

        let name = runner
            .transaction(|tx| async move {
                tx.execute("INSERT INTO t VALUES (1)", &[])?;
                Ok(tx.savepoint().to_string())
            })
            .await
            .unwrap();

        assert_eq!(
            conn.statements(),
            vec![
                format!("SAVEPOINT {}", name),
                "INSERT INTO t VALUES (1)".to_string(),
                format!("RELEASE {}", name),
            ]
        );
        assert!(!runner.queue().is_held());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_preserves_error() {
        let (conn, runner) = setup();
        conn.fail_on("ROLLBACK TO", ConnectionError::Statement("cleanup failed".into()));

        let err = runner
            .transaction(|tx| async move {
                tx.execute("INSERT INTO t VALUES (1)", &[])?;
                Err::<(), _>(TransactionError::from(ConnectionError::Constraint(
                    "UNIQUE constraint failed".into(),
                )))
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransactionError::Connection(ConnectionError::Constraint("UNIQUE constraint failed".into()))
        );
        assert_eq!(conn.statements_starting("ROLLBACK TO").len(), 1);
        assert_eq!(conn.statements_starting("RELEASE").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contention_retries_with_linear_backoff() {
        let (conn, runner) = setup();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let options = TransactionOptions::new().tries(3).backoff_ms(10);
        let err = runner
            .transaction_with(options, |_tx| {
                let starts = Arc::clone(&starts);
                async move {
                    starts.lock().push(Instant::now());
                    Err::<(), _>(busy())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, busy());
        let starts = starts.lock();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - starts[0], Duration::from_millis(10));
        assert_eq!(starts[2] - starts[1], Duration::from_millis(20));
        assert_eq!(conn.statements_starting("SAVEPOINT").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_contention_error_is_not_retried() {
        let (conn, runner) = setup();
        let mut calls = 0;

        let options = TransactionOptions::new().tries(3).backoff_ms(10);
        let err = runner
            .transaction_with(options, |_tx| {
                calls += 1;
                async { Err::<(), _>(TransactionError::aborted("bad input")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, TransactionError::aborted("bad input"));
        assert_eq!(calls, 1);
        assert_eq!(conn.statements_starting("SAVEPOINT").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_contention() {
        let (_conn, runner) = setup();
        let mut calls = 0;

        let options = TransactionOptions::new().tries(5).backoff_ms(1);
        let value = runner
            .transaction_with(options, |_tx| {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(busy())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_targets_current_attempt_frame() {
        let (conn, runner) = setup();
        let names = Arc::new(Mutex::new(Vec::new()));

        let options = TransactionOptions::new().tries(2).backoff_ms(5);
        let result = runner
            .transaction_with(options, |tx| {
                names.lock().push(tx.savepoint().to_string());
                async { Err::<(), _>(busy()) }
            })
            .await;
        assert!(result.is_err());

        let names = names.lock();
        let (a, b) = (&names[0], &names[1]);
        assert_ne!(a, b);
        assert_eq!(
            conn.statements(),
            vec![
                format!("SAVEPOINT {}", a),
                format!("ROLLBACK TO {}", a),
                format!("RELEASE {}", a),
                format!("SAVEPOINT {}", b),
                format!("ROLLBACK TO {}", b),
                format!("RELEASE {}", b),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_release_is_retried() {
        let (conn, runner) = setup();
        conn.fail_times("RELEASE", ConnectionError::Busy("database is busy".into()), 1);

        let options = TransactionOptions::new().tries(2);
        let value = runner
            .transaction_with(options, |tx| async move {
                tx.execute("INSERT INTO t VALUES (1)", &[])?;
                Ok(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(conn.statements_starting("SAVEPOINT").len(), 2);
        assert_eq!(conn.statements_starting("INSERT").len(), 2);
    }

    #[tokio::test]
    async fn test_savepoint_failure_is_an_attempt_failure() {
        let (conn, runner) = setup();
        conn.fail_on("SAVEPOINT", ConnectionError::Statement("cannot open savepoint".into()));

        let err = runner
            .transaction(|_tx| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, TransactionError::Connection(ConnectionError::Statement(_))));
        assert!(conn.statements_starting("ROLLBACK TO").is_empty());
    }

    #[tokio::test]
    async fn test_zero_tries_rejected() {
        let (conn, runner) = setup();
        let err = runner
            .transaction_with(TransactionOptions::new().tries(0), |_tx| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, TransactionError::InvalidOptions(_)));
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_transactions_are_fifo_and_not_interleaved() {
        let (conn, runner) = setup();
        let gate = runner.queue().acquire().await;

        let mut tasks = Vec::new();
        for i in 0..4 {
            let runner = runner.clone();
            tasks.push(tokio::spawn(async move {
                runner
                    .transaction(|tx| async move {
                        tx.execute(&format!("INSERT {} a", i), &[])?;
                        tokio::task::yield_now().await;
                        tx.execute(&format!("INSERT {} b", i), &[])?;
                        Ok(())
                    })
                    .await
            }));
            tokio::task::yield_now().await;
        }

        drop(gate);
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let inserts = conn.statements_starting("INSERT");
        let expected: Vec<String> = (0..4)
            .flat_map(|i| [format!("INSERT {} a", i), format!("INSERT {} b", i)])
            .collect();
        assert_eq!(inserts, expected);
    }

    #[tokio::test]
    async fn test_passthroughs_wait_for_open_transaction() {
        let (conn, runner) = setup();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let mut release_rx = Some(release_rx);

        let holder = {
            let runner = runner.clone();
            tokio::spawn(async move {
                runner
                    .transaction(|tx| {
                        let release_rx = release_rx.take();
                        async move {
                            tx.execute("INSERT inside", &[])?;
                            if let Some(rx) = release_rx {
                                let _ = rx.await;
                            }
                            Ok(())
                        }
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let outside = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.execute("INSERT outside", &[]).await })
        };
        tokio::task::yield_now().await;
        assert!(!conn.statements().iter().any(|s| s == "INSERT outside"));

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        outside.await.unwrap().unwrap();

        let statements = conn.statements();
        let released = statements.iter().position(|s| s.starts_with("RELEASE")).unwrap();
        let outside = statements.iter().position(|s| s == "INSERT outside").unwrap();
        assert!(released < outside);
    }

    #[tokio::test]
    async fn test_reentrant_calls_fail_fast() {
        let (conn, runner) = setup();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            runner.transaction(|tx| {
                let runner = runner.clone();
                async move {
                    tx.execute("INSERT inside", &[])?;
                    let query = runner.query_all("SELECT * FROM t", &[]).await;
                    let write = runner.execute("INSERT outside", &[]).await;
                    let inner = runner.transaction(|_inner| async { Ok(()) }).await;
                    Ok((query, write, inner))
                }
            }),
        )
        .await
        .expect("re-entrant call waited on its own slot");

        let (query, write, inner) = outcome.unwrap();
        assert_eq!(query, Err(TransactionError::Reentrant));
        assert_eq!(write, Err(TransactionError::Reentrant));
        assert_eq!(inner, Err(TransactionError::Reentrant));
        assert!(!conn.statements().iter().any(|s| s == "INSERT outside"));
        assert!(!runner.queue().is_held());

        // outside any body the passthroughs work again
        runner.execute("INSERT outside", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_runner_usable_inside_body() {
        let (_conn, runner) = setup();
        let (other_conn, other) = setup();

        runner
            .transaction(|_tx| {
                let other = other.clone();
                async move {
                    other.execute("INSERT elsewhere", &[]).await?;
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(other_conn.statements(), vec!["INSERT elsewhere"]);
    }

    #[tokio::test]
    async fn test_end_to_end_outer_rollback() {
        let sqlite = Arc::new(SqliteConnection::open_in_memory().unwrap());
        sqlite
            .exec_command("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let runner = TransactionRunner::new(sqlite.clone());

        let result: TransactionResult<()> = runner
            .transaction(|tx| async move {
                tx.execute("INSERT INTO users (id, name) VALUES (?, ?)", &[json!(1), json!("ghost")])?;
                Err(TransactionError::aborted("never mind"))
            })
            .await;
        assert!(result.is_err());

        let rows = runner.query_all("SELECT * FROM users", &[]).await.unwrap();
        assert!(rows.is_empty());
        assert!(sqlite.is_autocommit());
    }

    #[tokio::test]
    async fn test_end_to_end_real_busy_contention() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("contended.db");

        let sqlite = Arc::new(SqliteConnection::open(&path).unwrap());
        sqlite
            .exec_command("PRAGMA busy_timeout=0; CREATE TABLE t (v INTEGER)")
            .unwrap();
        let runner = TransactionRunner::new(sqlite.clone());

        let holder = rusqlite::Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE; INSERT INTO t VALUES (0)").unwrap();

        let attempts = Arc::new(Mutex::new(0));
        let options = TransactionOptions::new().tries(3).backoff_ms(1);
        let err = runner
            .transaction_with(options, |tx| {
                *attempts.lock() += 1;
                async move {
                    tx.execute("INSERT INTO t VALUES (?)", &[json!(1)])?;
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_contention(), "unexpected error: {err:?}");
        assert_eq!(*attempts.lock(), 3);
        assert!(sqlite.is_autocommit());

        holder.execute_batch("COMMIT").unwrap();
        runner
            .transaction(|tx| async move {
                tx.execute("INSERT INTO t VALUES (?)", &[json!(1)])?;
                Ok(())
            })
            .await
            .unwrap();

        let rows = runner.query_all("SELECT v FROM t ORDER BY v", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
