//! Per-call transaction options.

use std::fmt;
use std::time::Duration;

use crate::transaction::error::{TransactionError, TransactionResult};

/// How eagerly the write lock should be taken.
///
/// Reserved for engines that distinguish lock-acquisition modes; the
/// runner records it but the retry policy is the same for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Take the write lock at the first write.
    Deferred,
    /// Take the write lock when the transaction starts.
    #[default]
    Immediate,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Deferred => write!(f, "DEFERRED"),
            LockMode::Immediate => write!(f, "IMMEDIATE"),
        }
    }
}

impl std::str::FromStr for LockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEFERRED" => Ok(LockMode::Deferred),
            "IMMEDIATE" => Ok(LockMode::Immediate),
            _ => Err(format!("unknown lock mode: {}", s)),
        }
    }
}

/// Options for one `transaction(...)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    pub lock_mode: LockMode,
    /// Total attempts, including the first. At least 1.
    pub tries: u32,
    /// Backoff unit; the n-th retry waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            lock_mode: LockMode::Immediate,
            tries: 1,
            backoff: Duration::from_millis(10),
        }
    }
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose between [`LockMode::Immediate`] and [`LockMode::Deferred`].
    pub fn immediate(mut self, value: bool) -> Self {
        self.lock_mode = if value {
            LockMode::Immediate
        } else {
            LockMode::Deferred
        };
        self
    }

    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    pub fn backoff_ms(mut self, ms: u64) -> Self {
        self.backoff = Duration::from_millis(ms);
        self
    }

    pub fn is_immediate(&self) -> bool {
        self.lock_mode == LockMode::Immediate
    }

    /// Delay before the attempt following `attempt` (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt.saturating_add(1))
    }

    pub(crate) fn validate(&self) -> TransactionResult<()> {
        if self.tries == 0 {
            return Err(TransactionError::InvalidOptions(
                "tries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
