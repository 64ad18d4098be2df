// src/coord/rwlock.rs

use std::sync::Arc;

use crate::coord::keyed_lock::{KeyedLock, LockKind};
use crate::coord::lock_table::LockTable;

/// Permits in each key's semaphore; a writer takes all of them.
const MAX_READERS: u32 = u32::MAX >> 3;

/// Read/write lock scoped by key.
///
/// [`read`](Self::read) and [`write`](Self::write) are two facades over the
/// same per-key lock: any number of readers may hold a key together, a writer
/// excludes everyone else. Waiters are served in arrival order, so a queued
/// writer also holds back readers that arrive after it.
#[derive(Debug, Clone)]
pub struct KeyedRwLock {
    read: KeyedLock,
    write: KeyedLock,
}

impl Default for KeyedRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedRwLock {
    pub fn new() -> Self {
        let table = Arc::new(LockTable::new(MAX_READERS as usize));
        Self {
            read: KeyedLock::facade(Arc::clone(&table), 1, LockKind::Read),
            write: KeyedLock::facade(table, MAX_READERS, LockKind::Write),
        }
    }

    /// Shared access.
    pub fn read(&self) -> &KeyedLock {
        &self.read
    }

    /// Exclusive access.
    pub fn write(&self) -> &KeyedLock {
        &self.write
    }

    /// Whether no key is read, written, or waited on.
    pub fn is_idle(&self) -> bool {
        self.read.is_idle()
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.read.active_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_facade_takes_every_permit() {
        let rw = KeyedRwLock::new();
        assert!(rw.read().try_acquire("k"));
        assert!(!rw.write().try_acquire("k"));

        rw.read().release("k").unwrap();
        assert!(rw.write().try_acquire("k"));
        assert!(!rw.read().try_acquire("k"));

        rw.write().release("k").unwrap();
        assert!(rw.is_idle());
    }

    #[test]
    fn read_release_cannot_undo_a_write() {
        let rw = KeyedRwLock::new();
        assert!(rw.write().try_acquire("k"));
        assert!(rw.read().release("k").is_err());
        assert!(!rw.read().try_acquire("k"));

        rw.write().release("k").unwrap();
        assert!(rw.is_idle());
    }
}
