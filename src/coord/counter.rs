// src/coord/counter.rs

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{error, trace};

use crate::errors::{DeploydagError, Result};

/// Usage counter per key.
///
/// Tracks how many users a key currently has without excluding anyone. An
/// entry exists only while its count is above zero. Clones share counts.
#[derive(Debug, Clone, Default)]
pub struct KeyedCounter {
    counts: Arc<DashMap<String, usize>>,
}

impl KeyedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one user of `key`; returns the new count.
    pub fn increment(&self, key: &str) -> usize {
        let mut count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        trace!(key = %key, count = *count, "counter incremented");
        *count
    }

    /// Remove one user of `key`; returns the new count.
    ///
    /// Fails with [`DeploydagError::LockImbalance`] if `key` has no users.
    pub fn decrement(&self, key: &str) -> Result<usize> {
        match self.counts.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let count = occupied.get_mut();
                *count -= 1;
                let remaining = *count;
                if remaining == 0 {
                    occupied.remove();
                }
                trace!(key = %key, count = remaining, "counter decremented");
                Ok(remaining)
            }
            Entry::Vacant(_) => {
                error!(key = %key, "counter decremented below zero");
                Err(DeploydagError::LockImbalance {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Current count of `key`; `0` if unused.
    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).map_or(0, |c| *c)
    }

    pub fn in_use(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    /// Number of keys currently in use.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count a use of `key` until the returned guard is dropped.
    pub fn enter(&self, key: &str) -> CounterGuard {
        self.increment(key);
        CounterGuard {
            counter: self.clone(),
            key: key.to_string(),
        }
    }

    /// Run `f` while counted as a user of `key`.
    pub async fn with_use<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.enter(key);
        f().await
    }

    /// Blocking flavour of [`with_use`](Self::with_use).
    pub fn with_use_sync<F, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _guard = self.enter(key);
        f()
    }
}

/// One counted use of a key; decremented on drop.
#[derive(Debug)]
#[must_use = "the use ends as soon as the guard is dropped"]
pub struct CounterGuard {
    counter: KeyedCounter,
    key: String,
}

impl CounterGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        if let Err(e) = self.counter.decrement(&self.key) {
            error!(key = %self.key, error = %e, "failed to release counter guard");
        }
    }
}
