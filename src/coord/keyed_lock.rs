// src/coord/keyed_lock.rs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::coord::lock_table::LockTable;
use crate::errors::{DeploydagError, Result};

/// Which primitive a [`KeyedLock`] facade represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// One holder per key.
    Mutex,
    /// Up to the given number of holders per key.
    Bounded(usize),
    /// Shared side of a [`KeyedRwLock`](crate::coord::KeyedRwLock).
    Read,
    /// Exclusive side of a [`KeyedRwLock`](crate::coord::KeyedRwLock).
    Write,
}

/// Lock scoped by an arbitrary string key, created on first use and dropped
/// when the last holder releases it.
///
/// Keys are independent of each other: contention on `"host:db1"` never
/// delays `"host:db2"`. Cloning is cheap and clones share the same keys.
///
/// ```no_run
/// # async fn demo() -> deploydag::errors::Result<()> {
/// use deploydag::coord::KeyedLock;
///
/// let hosts = KeyedLock::mutex();
/// hosts
///     .with_lock("host:db1", || async {
///         // only one deployment step touches db1 at a time
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KeyedLock {
    table: Arc<LockTable>,
    /// Permits one acquire takes from the key's semaphore.
    weight: u32,
    kind: LockKind,
}

impl KeyedLock {
    /// Mutual exclusion per key.
    pub fn mutex() -> Self {
        Self::facade(Arc::new(LockTable::new(1)), 1, LockKind::Mutex)
    }

    /// At most `limit` concurrent holders per key.
    pub fn bounded(limit: usize) -> Self {
        let clamped = limit.clamp(1, Semaphore::MAX_PERMITS);
        if clamped != limit {
            warn!(requested = limit, limit = clamped, "bounded lock limit out of range; clamping");
        }
        Self::facade(
            Arc::new(LockTable::new(clamped)),
            1,
            LockKind::Bounded(clamped),
        )
    }

    pub(crate) fn facade(table: Arc<LockTable>, weight: u32, kind: LockKind) -> Self {
        Self {
            table,
            weight,
            kind,
        }
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Wait until `key` can be held.
    ///
    /// Every successful acquire must be paired with exactly one
    /// [`release`](Self::release). Dropping the future before it resolves
    /// acquires nothing.
    pub async fn acquire(&self, key: &str) -> Result<()> {
        self.table.acquire(key, self.weight).await
    }

    /// Hold `key` if that is possible without waiting.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.table.try_acquire(key, self.weight)
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`.
    pub async fn acquire_timeout(&self, key: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.acquire(key)).await {
            Ok(res) => res,
            Err(_) => {
                debug!(key = %key, kind = ?self.kind, ?timeout, "keyed lock acquire timed out");
                Err(DeploydagError::Interrupted(format!(
                    "timed out after {timeout:?} waiting for key '{key}'"
                )))
            }
        }
    }

    /// Release a hold taken by `acquire` or a successful `try_acquire`.
    ///
    /// Fails with [`DeploydagError::LockImbalance`] if `key` is not held
    /// through this facade.
    pub fn release(&self, key: &str) -> Result<()> {
        self.table.release(key, self.weight).inspect_err(|_| {
            error!(key = %key, kind = ?self.kind, "release without matching acquire");
        })
    }

    /// Acquire `key` and return a guard releasing it on drop.
    pub async fn lock(&self, key: &str) -> Result<KeyedLockGuard> {
        self.acquire(key).await?;
        Ok(KeyedLockGuard::new(self.clone(), key))
    }

    pub fn try_lock(&self, key: &str) -> Option<KeyedLockGuard> {
        self.try_acquire(key)
            .then(|| KeyedLockGuard::new(self.clone(), key))
    }

    /// Run `f` while holding `key`.
    ///
    /// The hold is released on every exit path, including a panic in `f` or
    /// the returned future being dropped.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.lock(key).await?;
        let out = f().await;
        guard.release()?;
        Ok(out)
    }

    /// Keys that currently have holders or waiters.
    pub fn active_keys(&self) -> Vec<String> {
        self.table.keys()
    }

    /// Whether no key is held or waited on.
    pub fn is_idle(&self) -> bool {
        self.table.is_empty()
    }

    /// Holders plus waiters on `key`.
    pub fn references(&self, key: &str) -> usize {
        self.table.refs(key)
    }
}

/// Held key of a [`KeyedLock`]; released when dropped.
#[derive(Debug)]
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyedLockGuard {
    lock: KeyedLock,
    key: String,
    released: bool,
}

impl KeyedLockGuard {
    fn new(lock: KeyedLock, key: &str) -> Self {
        Self {
            lock,
            key: key.to_string(),
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release now and report the outcome instead of logging it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release(&self.key)
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.release(&self.key) {
            error!(key = %self.key, error = %e, "failed to release keyed lock guard");
        }
    }
}
