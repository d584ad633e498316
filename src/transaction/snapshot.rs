//! One-shot revert points inside a transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::transaction::error::TransactionResult;
use crate::transaction::frame::Frame;

/// A revert capability taken with [`Tx::snapshot`](crate::transaction::Tx::snapshot).
///
/// The first [`revert`](Snapshot::revert) rolls the database back to the
/// moment the snapshot was taken; later calls do nothing.
///
/// A snapshot belongs to the transaction body that took it. `revert`
/// issues SQL directly on the shared connection without going through the
/// serialization queue, so call it only from inside that body, never after
/// it has returned or from another task.
pub struct Snapshot {
    conn: Arc<dyn Connection>,
    name: String,
    owner: Arc<Frame>,
    used: AtomicBool,
}

impl Snapshot {
    pub(crate) fn new(conn: Arc<dyn Connection>, name: String, owner: Arc<Frame>) -> Self {
        Self {
            conn,
            name,
            owner,
            used: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    /// Undo everything done since the snapshot was taken.
    ///
    /// A failing ROLLBACK TO is returned to the caller, unless the owning
    /// transaction resolved its frame in the meantime; that case is only
    /// logged. The RELEASE that follows is best effort. Once the owner is
    /// resolved nothing is issued at all.
    ///
    /// Must be called from the body that owns the snapshot while it still
    /// holds the queue slot.
    pub fn revert(&self) -> TransactionResult<()> {
        if self.used.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.owner.state().is_resolved() {
            // the body is gone and the queue slot may belong to someone else
            warn!(
                savepoint = %self.name,
                owner = %self.owner.name(),
                "snapshot reverted after its transaction resolved; ignoring"
            );
            return Ok(());
        }

        let rolled_back = self.conn.exec_command(&format!("ROLLBACK TO {}", self.name));
        if let Err(e) = self.conn.exec_command(&format!("RELEASE {}", self.name)) {
            debug!(savepoint = %self.name, error = %e, "snapshot release failed");
        }

        match rolled_back {
            Ok(()) => {
                debug!(savepoint = %self.name, "snapshot reverted");
                Ok(())
            }
            Err(e) if self.owner.state().is_resolved() => {
                warn!(
                    savepoint = %self.name,
                    owner = %self.owner.name(),
                    error = %e,
                    "snapshot reverted after its transaction resolved; ignoring"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("name", &self.name)
            .field("used", &self.is_used())
            .finish()
    }
}
