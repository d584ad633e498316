//! Transaction management for bunely.
//!
//! Nested transactions are built on named savepoints over one shared
//! connection. Every top-level transaction is admitted through a FIFO
//! serialization queue, so only one body ever has statements in flight.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionRunner                         │
//! │  (admission, outermost savepoint, busy retry + backoff)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Serializ.   │       │     Tx      │       │    Name     │
//!  │   Queue     │       │ (frames,    │       │  Generator  │
//!  │   (FIFO)    │       │  snapshots) │       │             │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bunely::sql::Executor;
//! use bunely::transaction::{TransactionOptions, TransactionRunner};
//!
//! let runner = TransactionRunner::new(conn);
//!
//! runner
//!     .transaction_with(TransactionOptions::new().tries(3), |tx| async move {
//!         tx.execute("INSERT INTO users (name) VALUES (?)", &[json!("alice")])?;
//!
//!         // rolled back on its own if the inner body fails
//!         tx.nested(|inner| async move {
//!             inner.execute("UPDATE users SET name = ? WHERE id = 1", &[json!("bob")])?;
//!             Ok(())
//!         })
//!         .await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

mod context;
mod error;
mod frame;
mod names;
mod options;
mod queue;
mod runner;
mod snapshot;

pub use context::Tx;
pub use error::{TransactionError, TransactionResult};
pub use frame::FrameState;
pub use names::NameGenerator;
pub use options::{LockMode, TransactionOptions};
pub use queue::{QueuePermit, SerializationQueue};
pub use runner::TransactionRunner;
pub use snapshot::Snapshot;
