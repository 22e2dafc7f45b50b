// Keywarden: Key operation lock
//
// The single writer lock every key-mutating operation runs under. Waiting
// is bounded: an acquirer that cannot get the lock within
// `poll_interval * max_attempts` fails with `LockContention` instead of
// queueing forever behind a stuck holder.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{KeywardenError, Result};

pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);
pub const DEFAULT_LOCK_MAX_ATTEMPTS: u32 = 200;

#[derive(Debug)]
pub struct OpLock {
    inner: Mutex<()>,
    poll_interval: Duration,
    max_attempts: u32,
}

/// Held for the duration of one mutating operation.
pub type OpGuard<'a> = MutexGuard<'a, ()>;

impl OpLock {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            inner: Mutex::new(()),
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total time an acquirer waits before giving up.
    pub fn max_wait(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }

    /// Acquire the lock, waiting at most `max_wait()`.
    pub async fn acquire(&self, operation: &str) -> Result<OpGuard<'_>> {
        if let Ok(guard) = self.inner.try_lock() {
            return Ok(guard);
        }

        tracing::debug!(operation, "Waiting for key operation lock");
        match tokio::time::timeout(self.max_wait(), self.inner.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                tracing::warn!(
                    operation,
                    attempts = self.max_attempts,
                    "Key operation lock contended; giving up"
                );
                Err(KeywardenError::LockContention(self.max_attempts))
            }
        }
    }
}

impl Default for OpLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_POLL_INTERVAL, DEFAULT_LOCK_MAX_ATTEMPTS)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
