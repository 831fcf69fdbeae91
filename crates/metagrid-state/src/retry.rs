//! The run-transactionally combinator.
//!
//! Business logic is written as a closure over a [`Transaction`]; the
//! combinator begins the transaction, runs the closure, commits, and on a
//! retryable failure starts over against a fresh snapshot.

use std::fmt::Display;
use std::time::Duration;

use metagrid_core::config::RetryConfig;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::store::{KvStore, Transaction};

/// Errors that may be resolved by re-running the whole transaction.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StateError {
    fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}

/// Bounds on transparent conflict retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 100,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given 1-based retry attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `body` in a transaction, committing on success and retrying the whole
/// body when it or the commit fails with a retryable error.
pub fn run_transaction<T, E, F>(store: &KvStore, policy: &RetryPolicy, mut body: F) -> Result<T, E>
where
    F: FnMut(&mut Transaction) -> Result<T, E>,
    E: From<StateError> + Retryable + Display,
{
    let mut attempt = 0u32;
    loop {
        let mut tx = store.begin()?;
        let outcome = match body(&mut tx) {
            Ok(value) => tx.commit().map(|_| value).map_err(E::from),
            Err(e) => {
                tx.cancel();
                Err(e)
            }
        };
        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(retries = attempt, "transaction committed after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.backoff(attempt);
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "retrying transaction"
                );
                std::thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}
