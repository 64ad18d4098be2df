// src/coord/mod.rs

//! Keyed coordination primitives for orchestration code running many
//! deployment branches at once.
//!
//! - [`lock_table`] holds the reference-counted per-key semaphores every
//!   keyed lock is built on.
//! - [`keyed_lock`] provides the [`KeyedLock`] facade: a per-key mutex or a
//!   per-key bounded-admission lock.
//! - [`rwlock`] provides [`KeyedRwLock`], a per-key read/write lock.
//! - [`counter`] provides [`KeyedCounter`] for plain usage tracking.
//! - [`barrier`] provides [`PartitionBarrier`], named rendezvous points.
//!
//! None of these are used by the scheduler itself.

pub mod barrier;
pub mod counter;
pub mod keyed_lock;
pub(crate) mod lock_table;
pub mod rwlock;

pub use barrier::{JoinOutcome, PartitionBarrier};
pub use counter::{CounterGuard, KeyedCounter};
pub use keyed_lock::{KeyedLock, KeyedLockGuard, LockKind};
pub use rwlock::KeyedRwLock;
