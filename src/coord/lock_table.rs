// src/coord/lock_table.rs

//! Reference-counted, on-demand semaphores keyed by string.
//!
//! Every keyed lock facade sits on a [`LockTable`]. A key's [`LockBlock`] is
//! created by the first acquirer and removed the moment its reference count
//! drops back to zero. The count covers holders and in-flight acquirers alike,
//! so a block cannot disappear under someone still waiting on it.
//!
//! Each get-or-create-and-increment and decrement-and-maybe-remove happens
//! inside a single `DashMap::entry` call, under that key's shard lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::errors::{DeploydagError, Result};

/// Per-key bookkeeping.
#[derive(Debug)]
pub(crate) struct LockBlock {
    semaphore: Arc<Semaphore>,
    /// Holders plus acquirers still waiting on `semaphore`.
    refs: usize,
    /// Outstanding holds, by the number of permits each one took.
    holds: HashMap<u32, usize>,
    /// Thread that created the block; diagnostics only.
    creator: ThreadId,
}

impl LockBlock {
    fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            refs: 0,
            holds: HashMap::new(),
            creator: std::thread::current().id(),
        }
    }
}

/// Map from key to [`LockBlock`], each block a semaphore with `permits`
/// permits.
#[derive(Debug)]
pub(crate) struct LockTable {
    blocks: DashMap<String, LockBlock>,
    permits: usize,
}

impl LockTable {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            blocks: DashMap::new(),
            permits,
        }
    }

    /// Take `weight` permits on `key`, waiting as long as needed.
    ///
    /// Fails with [`DeploydagError::Interrupted`] only if the key's semaphore
    /// was closed. Dropping the future mid-wait undoes the reference taken on
    /// entry.
    pub(crate) async fn acquire(&self, key: &str, weight: u32) -> Result<()> {
        let semaphore = self.enter(key);
        let pending = PendingAcquire {
            table: self,
            key,
            armed: true,
        };

        let permit = semaphore.acquire_many(weight).await.map_err(|_| {
            DeploydagError::Interrupted(format!("lock for key '{key}' was closed"))
        })?;
        permit.forget();
        self.mark_held(key, weight);
        pending.disarm();

        trace!(key = %key, weight, "acquired keyed lock");
        Ok(())
    }

    /// Take `weight` permits on `key` only if they are free right now.
    ///
    /// A failed attempt leaves no trace in the table.
    pub(crate) fn try_acquire(&self, key: &str, weight: u32) -> bool {
        match self.blocks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let block = occupied.get_mut();
                match block.semaphore.try_acquire_many(weight) {
                    Ok(permit) => {
                        permit.forget();
                        block.refs += 1;
                        *block.holds.entry(weight).or_insert(0) += 1;
                        true
                    }
                    Err(_) => false,
                }
            }
            Entry::Vacant(vacant) => {
                let mut block = LockBlock::new(self.permits);
                let Ok(permit) = block.semaphore.try_acquire_many(weight) else {
                    return false;
                };
                permit.forget();
                block.refs = 1;
                block.holds.insert(weight, 1);
                debug!(key = %key, "created keyed lock block");
                vacant.insert(block);
                true
            }
        }
    }

    /// Give back a hold of `weight` permits on `key`, dropping the block if
    /// nobody else references it.
    ///
    /// A hold taken with one weight cannot be released with another, so a
    /// read release never frees a writer's hold.
    pub(crate) fn release(&self, key: &str, weight: u32) -> Result<()> {
        match self.blocks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let block = occupied.get_mut();
                let remaining = match block.holds.get_mut(&weight) {
                    Some(count) => {
                        *count -= 1;
                        *count
                    }
                    None => {
                        return Err(DeploydagError::LockImbalance {
                            key: key.to_string(),
                        });
                    }
                };
                if remaining == 0 {
                    block.holds.remove(&weight);
                }
                block.refs -= 1;
                block.semaphore.add_permits(weight as usize);
                trace!(key = %key, weight, refs = block.refs, "released keyed lock");

                if block.refs == 0 {
                    let (_, block) = occupied.remove_entry();
                    debug!(key = %key, creator = ?block.creator, "reclaimed keyed lock block");
                }
                Ok(())
            }
            Entry::Vacant(_) => Err(DeploydagError::LockImbalance {
                key: key.to_string(),
            }),
        }
    }

    /// Keys that currently have a block.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.blocks.iter().map(|e| e.key().clone()).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Reference count of `key`'s block; `0` if it has none.
    pub(crate) fn refs(&self, key: &str) -> usize {
        self.blocks.get(key).map_or(0, |b| b.refs)
    }

    /// Get-or-create the block for `key` and take a reference on it.
    fn enter(&self, key: &str) -> Arc<Semaphore> {
        let mut block = self.blocks.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "created keyed lock block");
            LockBlock::new(self.permits)
        });
        block.refs += 1;
        Arc::clone(&block.semaphore)
    }

    /// Drop a reference taken by [`enter`](Self::enter) without a permit.
    fn leave(&self, key: &str) {
        if let Entry::Occupied(mut occupied) = self.blocks.entry(key.to_string()) {
            let block = occupied.get_mut();
            block.refs -= 1;
            if block.refs == 0 {
                occupied.remove();
                debug!(key = %key, "reclaimed keyed lock block after abandoned acquire");
            }
        }
    }

    fn mark_held(&self, key: &str, weight: u32) {
        if let Some(mut block) = self.blocks.get_mut(key) {
            *block.holds.entry(weight).or_insert(0) += 1;
        }
    }
}

/// Undoes [`LockTable::enter`] unless the acquire completed.
struct PendingAcquire<'a> {
    table: &'a LockTable,
    key: &'a str,
    armed: bool,
}

impl PendingAcquire<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.leave(self.key);
        }
    }
}
