//! FIFO admission to the single writer.
//!
//! The queue holds one "current holder" slot and a list of suspended
//! waiters in arrival order. Releasing the slot hands it directly to the
//! oldest waiter, so nobody can barge in between a release and the next
//! admission.
//!
//! While a task holds a slot it carries a task-local marker for that
//! queue, so a holder that tries to enter its own queue again can be told
//! apart from an ordinary waiter instead of waiting on itself forever.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

tokio::task_local! {
    /// Queues whose slot the current task holds, outermost first.
    static HELD: Vec<usize>;
}

#[derive(Default)]
struct QueueState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Admits one critical section at a time, in call order.
///
/// A failing or panicking body releases its slot like any other, so the
/// queue is never poisoned. Admission itself cannot fail.
#[derive(Clone, Default)]
pub struct SerializationQueue {
    state: Arc<Mutex<QueueState>>,
}

impl SerializationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` once every earlier caller has finished.
    ///
    /// Calling this from inside a body that already holds this queue
    /// never completes; check [`held_by_current_task`] first.
    ///
    /// [`held_by_current_task`]: SerializationQueue::held_by_current_task
    pub async fn run<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        self.holding(body()).await
    }

    /// Drive `fut` with this queue marked as held by the current task.
    ///
    /// Only meaningful while a [`QueuePermit`] for this queue is alive.
    pub async fn holding<Fut: Future>(&self, fut: Fut) -> Fut::Output {
        let mut held = HELD.try_with(|held| held.clone()).unwrap_or_default();
        held.push(self.id());
        HELD.scope(held, fut).await
    }

    /// Whether the running task is inside a body admitted by this queue.
    ///
    /// Tasks spawned from such a body do not inherit the marker.
    pub fn held_by_current_task(&self) -> bool {
        let id = self.id();
        HELD.try_with(|held| held.contains(&id)).unwrap_or(false)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    /// Wait for the slot. It is held until the returned permit drops.
    pub async fn acquire(&self) -> QueuePermit {
        let rx = {
            let mut state = self.state.lock();
            if !state.held {
                state.held = true;
                trace!("queue slot taken without waiting");
                return QueuePermit {
                    queue: self.clone(),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            trace!(waiters = state.waiters.len(), "queued for admission");
            rx
        };

        let mut pending = PendingAdmission {
            queue: self.clone(),
            rx: Some(rx),
        };
        if let Some(rx) = pending.rx.as_mut() {
            // the sender is only dropped after a send, and `hand_off` never
            // drops a sender without sending to it
            let _ = rx.await;
        }
        pending.rx = None;

        QueuePermit {
            queue: self.clone(),
        }
    }

    /// Number of callers waiting behind the current holder.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Whether some caller currently holds the slot.
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Pass the slot to the oldest live waiter, or mark it free.
    fn hand_off(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
            // that waiter was cancelled; try the next one
        }
        state.held = false;
    }
}

/// Proof of admission; dropping it admits the next waiter.
#[must_use = "the queue slot is released as soon as the permit is dropped"]
pub struct QueuePermit {
    queue: SerializationQueue,
}

impl Drop for QueuePermit {
    fn drop(&mut self) {
        self.queue.hand_off();
    }
}

/// A waiter whose future may be dropped before it observes its admission.
struct PendingAdmission {
    queue: SerializationQueue,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for PendingAdmission {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            // the slot was handed to us after all; pass it on
            if rx.try_recv().is_ok() {
                self.queue.hand_off();
            }
        }
    }
}
