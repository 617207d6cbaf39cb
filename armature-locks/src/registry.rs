//! Lock registry mapping keys to reference-counted mutexes

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, trace};

use crate::key::LockKey;

type Table = StdMutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>;

/// Registry of named locks.
///
/// The registry owns a table mapping each [`LockKey`] to a reference-counted
/// async mutex. Entries are created lazily on first acquisition and removed
/// once the last holder or waiter is gone, so the table only ever contains
/// keys that are currently contended or held.
///
/// The registry is an explicit object: construct one at process start and
/// pass it (typically behind an `Arc`) to every handler that needs it.
///
/// # Lock ordering
///
/// Handlers that hold multiple locks at once must acquire them in the
/// canonical [`LockKey`] order (resource type, then name) regardless of the
/// order the resources appear in their inputs; otherwise two handlers
/// locking the same pair in opposite orders can deadlock. Use
/// [`acquire_pair`](Self::acquire_pair), which sorts for you.
#[derive(Debug, Default)]
pub struct LockRegistry {
    table: Arc<Table>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for (resource_type, name), waiting until no other
    /// task holds it. Locks on distinct keys never contend.
    ///
    /// There is no acquisition deadline: this waits as long as it takes for
    /// the current holder to release. Callers that need a bound can wrap the
    /// call in `tokio::time::timeout`; the returned future is
    /// cancellation-safe and abandoning it releases nothing.
    pub async fn acquire(&self, resource_type: &str, name: &str) -> LockGuard {
        let key = LockKey::new(resource_type, name);
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(key.clone()).or_default())
        };

        trace!(key = %key, "waiting for lock");
        let permit = entry.lock_owned().await;
        debug!(key = %key, "lock acquired");

        LockGuard {
            key,
            table: Arc::clone(&self.table),
            permit: Some(permit),
        }
    }

    /// Acquire two locks in the canonical key order, regardless of argument
    /// order. The guards are returned in argument order.
    ///
    /// Panics if both arguments name the same key (re-acquiring a held lock
    /// is a programming error and would otherwise deadlock).
    pub async fn acquire_pair(
        &self,
        first: (&str, &str),
        second: (&str, &str),
    ) -> (LockGuard, LockGuard) {
        let first_key = LockKey::new(first.0, first.1);
        let second_key = LockKey::new(second.0, second.1);
        assert_ne!(first_key, second_key, "acquire_pair called with identical keys");

        if first_key < second_key {
            let a = self.acquire(first.0, first.1).await;
            let b = self.acquire(second.0, second.1).await;
            (a, b)
        } else {
            let b = self.acquire(second.0, second.1).await;
            let a = self.acquire(first.0, first.1).await;
            (a, b)
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token for one held lock. Releases exactly once, when dropped, on every
/// exit path including panics and early returns.
#[derive(Debug)]
pub struct LockGuard {
    key: LockKey,
    table: Arc<Table>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Release the lock explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // The table lock is held across the release so that the
        // strong-count check cannot race a concurrent acquire cloning the
        // entry out of the table.
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        self.permit.take();
        if let Some(entry) = table.get(&self.key)
            && Arc::strong_count(entry) == 1
        {
            table.remove(&self.key);
        }
        debug!(key = %self.key, "lock released");
    }
}
