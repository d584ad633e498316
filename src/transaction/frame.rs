//! Savepoint frames and their lifecycle.
//!
//! A frame is one named savepoint plus its state. The state leaves `Open`
//! exactly once: to `Committed` after a successful RELEASE, or to
//! `RolledBack` after the ROLLBACK TO + RELEASE unwind. Nothing is ever
//! issued for a frame that has left `Open`.
//!
//! A frame has at most one open child at a time. Two sibling savepoints
//! open together would share one engine stack, and releasing the first
//! would silently release the second.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::transaction::error::{TransactionError, TransactionResult};

/// Lifecycle of a savepoint frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Open,
    Committed,
    RolledBack,
}

impl FrameState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, FrameState::Open)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameState::Open => write!(f, "open"),
            FrameState::Committed => write!(f, "committed"),
            FrameState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// One open savepoint.
#[derive(Debug)]
pub(crate) struct Frame {
    name: String,
    state: Mutex<FrameState>,
    child_active: AtomicBool,
}

impl Frame {
    /// Issue `SAVEPOINT <name>` and track the new frame.
    pub(crate) fn open(conn: &dyn Connection, name: String) -> TransactionResult<Arc<Frame>> {
        conn.exec_command(&format!("SAVEPOINT {}", name))?;
        debug!(savepoint = %name, "savepoint opened");
        Ok(Arc::new(Frame {
            name,
            state: Mutex::new(FrameState::Open),
            child_active: AtomicBool::new(false),
        }))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> FrameState {
        *self.state.lock()
    }

    /// Fail with [`TransactionError::Finalized`] unless the frame is open.
    pub(crate) fn ensure_open(&self) -> TransactionResult<()> {
        match self.state() {
            FrameState::Open => Ok(()),
            state => Err(TransactionError::Finalized {
                savepoint: self.name.clone(),
                state,
            }),
        }
    }

    /// Reserve the single child slot of this frame.
    ///
    /// Fails with [`TransactionError::ChildActive`] while another child
    /// holds it. The slot is freed when the returned claim drops.
    pub(crate) fn claim_child(&self) -> TransactionResult<ChildClaim<'_>> {
        if self
            .child_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransactionError::ChildActive {
                savepoint: self.name.clone(),
            });
        }
        Ok(ChildClaim { frame: self })
    }

    /// Fail with [`TransactionError::ChildActive`] if a child is open.
    pub(crate) fn ensure_no_child(&self) -> TransactionResult<()> {
        if self.child_active.load(Ordering::Acquire) {
            return Err(TransactionError::ChildActive {
                savepoint: self.name.clone(),
            });
        }
        Ok(())
    }

    /// RELEASE the frame if it is still open.
    ///
    /// Returns `Ok(false)` without touching the connection when the frame
    /// was already resolved. A failed RELEASE leaves the frame open.
    pub(crate) fn release(&self, conn: &dyn Connection) -> TransactionResult<bool> {
        let mut state = self.state.lock();
        if state.is_resolved() {
            return Ok(false);
        }
        conn.exec_command(&format!("RELEASE {}", self.name))?;
        *state = FrameState::Committed;
        debug!(savepoint = %self.name, "savepoint released");
        Ok(true)
    }

    /// ROLLBACK TO and RELEASE the frame if it is still open.
    ///
    /// Errors from either statement are logged and dropped; the frame ends
    /// up `RolledBack` regardless. Returns `false` when the frame was
    /// already resolved and nothing was issued.
    pub(crate) fn abort(&self, conn: &dyn Connection) -> bool {
        let mut state = self.state.lock();
        if state.is_resolved() {
            return false;
        }
        if let Err(e) = conn.exec_command(&format!("ROLLBACK TO {}", self.name)) {
            warn!(savepoint = %self.name, error = %e, "rollback to savepoint failed during unwind");
        }
        if let Err(e) = conn.exec_command(&format!("RELEASE {}", self.name)) {
            warn!(savepoint = %self.name, error = %e, "release failed during unwind");
        }
        *state = FrameState::RolledBack;
        debug!(savepoint = %self.name, "savepoint rolled back");
        true
    }
}

/// Holds a frame's child slot.
pub(crate) struct ChildClaim<'a> {
    frame: &'a Frame,
}

impl Drop for ChildClaim<'_> {
    fn drop(&mut self) {
        self.frame.child_active.store(false, Ordering::Release);
    }
}

/// Settles a frame once its body has produced an outcome.
///
/// If the guard is dropped before [`settle`](FrameGuard::settle) runs (the
/// body future was cancelled or panicked), the frame is rolled back.
pub(crate) struct FrameGuard {
    frame: Arc<Frame>,
    conn: Arc<dyn Connection>,
}

impl FrameGuard {
    pub(crate) fn new(frame: Arc<Frame>, conn: Arc<dyn Connection>) -> Self {
        Self { frame, conn }
    }

    /// Release on success; roll back and release on failure.
    ///
    /// A failing RELEASE counts as a failure of the body. Cleanup errors
    /// never replace the error that is returned.
    pub(crate) fn settle<T>(self, outcome: TransactionResult<T>) -> TransactionResult<T> {
        let outcome = outcome.and_then(|value| self.frame.release(&*self.conn).map(|_| value));
        if let Err(e) = &outcome {
            debug!(savepoint = %self.frame.name, error = %e, "unwinding savepoint");
            self.frame.abort(&*self.conn);
        }
        outcome
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.frame.abort(&*self.conn) {
            warn!(savepoint = %self.frame.name, "savepoint abandoned before settling; rolled back");
        }
    }
}
