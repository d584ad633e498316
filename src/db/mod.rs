//! High-level database handle.
//!
//! [`Bunely`] ties one SQLite connection to a transaction runner and adds
//! serialized, non-transactional passthroughs and CRUD helpers.

mod api;

pub use api::{Bunely, BunelyConfig};
