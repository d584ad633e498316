//! Transaction handles.
//!
//! A [`Tx`] is one active savepoint frame bound to the shared connection.
//! Statements run straight through to the connection; nesting opens a
//! child frame whose stack is the parent's stack plus its own name.
//!
//! Once a handle's frame is released or rolled back the handle is
//! finalized: every further call fails with
//! [`TransactionError::Finalized`] instead of issuing SQL.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::{Connection, Row, WriteResult};
use crate::sql::Executor;
use crate::transaction::error::TransactionResult;
use crate::transaction::frame::{Frame, FrameGuard, FrameState};
use crate::transaction::names::NameGenerator;
use crate::transaction::snapshot::Snapshot;

/// Handle to an active savepoint frame.
///
/// Cloning is cheap and every clone refers to the same frame.
#[derive(Clone)]
pub struct Tx {
    conn: Arc<dyn Connection>,
    names: Arc<NameGenerator>,
    frame: Arc<Frame>,
    stack: Arc<[String]>,
}

impl Tx {
    /// Open an outermost frame.
    pub(crate) fn begin(
        conn: Arc<dyn Connection>,
        names: Arc<NameGenerator>,
    ) -> TransactionResult<(Tx, FrameGuard)> {
        Self::open(conn, names, &[])
    }

    fn open(
        conn: Arc<dyn Connection>,
        names: Arc<NameGenerator>,
        parent: &[String],
    ) -> TransactionResult<(Tx, FrameGuard)> {
        let frame = Frame::open(&*conn, names.next_name())?;
        let stack: Arc<[String]> = parent
            .iter()
            .cloned()
            .chain(std::iter::once(frame.name().to_string()))
            .collect();
        let guard = FrameGuard::new(Arc::clone(&frame), Arc::clone(&conn));
        let tx = Tx {
            conn,
            names,
            frame,
            stack,
        };
        Ok((tx, guard))
    }

    /// Name of this handle's savepoint.
    pub fn savepoint(&self) -> &str {
        self.frame.name()
    }

    /// Savepoint names from the outermost frame down to this one.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Nesting depth; the outermost frame has depth 1.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn state(&self) -> FrameState {
        self.frame.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == FrameState::Open
    }

    /// Run `body` inside a child savepoint.
    ///
    /// On success the child frame is released (unless it is already
    /// resolved). On failure it is rolled back and released, suppressing
    /// any cleanup error, and the body's error is returned unchanged.
    ///
    /// A handle has at most one open child. Starting a second `nested` on
    /// the same handle while the first is still running (for example by
    /// joining two of them) fails with [`TransactionError::ChildActive`]
    /// before any SQL is issued; run siblings one after the other.
    ///
    /// [`TransactionError::ChildActive`]: crate::transaction::TransactionError::ChildActive
    pub async fn nested<F, Fut, T>(&self, body: F) -> TransactionResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = TransactionResult<T>>,
    {
        self.frame.ensure_open()?;
        let _claim = self.frame.claim_child()?;
        let (child, guard) = Self::open(Arc::clone(&self.conn), Arc::clone(&self.names), &self.stack)?;
        let outcome = body(child).await;
        guard.settle(outcome)
    }

    /// Take a one-shot revert point at the current position.
    ///
    /// Not available while a nested transaction of this handle is open;
    /// take the snapshot from the innermost handle instead.
    pub fn snapshot(&self) -> TransactionResult<Snapshot> {
        self.frame.ensure_open()?;
        self.frame.ensure_no_child()?;
        let name = self.names.next_name();
        self.conn.exec_command(&format!("SAVEPOINT {}", name))?;
        Ok(Snapshot::new(Arc::clone(&self.conn), name, Arc::clone(&self.frame)))
    }
}

impl Executor for Tx {
    fn execute(&self, sql: &str, params: &[Value]) -> TransactionResult<WriteResult> {
        self.frame.ensure_open()?;
        Ok(self.conn.execute(sql, params)?)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> TransactionResult<Option<Row>> {
        self.frame.ensure_open()?;
        Ok(self.conn.query_one(sql, params)?)
    }

    fn query_all(&self, sql: &str, params: &[Value]) -> TransactionResult<Vec<Row>> {
        self.frame.ensure_open()?;
        Ok(self.conn.query_all(sql, params)?)
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("stack", &self.stack)
            .field("state", &self.state())
            .finish()
    }
}
