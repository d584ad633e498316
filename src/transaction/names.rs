//! Savepoint name generation.

use std::sync::atomic::{AtomicU64, Ordering};

use ulid::Ulid;

/// Produces savepoint names that are unique for the process lifetime.
///
/// Each generator is seeded with a random ULID prefix, so two generators
/// never collide, and counts upward from there. Names only contain
/// `[a-z0-9_]` and can be embedded unquoted in `SAVEPOINT`, `RELEASE` and
/// `ROLLBACK TO`.
#[derive(Debug)]
pub struct NameGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self {
            prefix: format!("sp_{}", Ulid::new().to_string().to_lowercase()),
            counter: AtomicU64::new(0),
        }
    }

    /// Next unused name.
    pub fn next_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", self.prefix, n)
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
