// src/coord/barrier.rs

//! Named rendezvous points for parallel deployment branches.
//!
//! A partition is created with a fixed member set. Each member `join`s once;
//! every join waits until the last member has joined, then all of them are
//! released together. Re-creating or removing a partition releases its
//! waiters as [`JoinOutcome::Abandoned`]: they were let go without the
//! barrier being met.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{DeploydagError, Result};

/// How a `join` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Every member joined.
    Satisfied,
    /// The partition was replaced or removed first. Inconclusive.
    Abandoned,
    /// No partition with that name exists; nothing happened.
    UnknownPartition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Satisfied,
    Abandoned,
}

#[derive(Debug)]
struct PartitionState {
    pending: BTreeSet<String>,
    phase: Phase,
}

#[derive(Debug)]
struct Partition {
    name: String,
    members: BTreeSet<String>,
    /// Pending set and phase; every change wakes all joiners.
    state: watch::Sender<PartitionState>,
}

impl Partition {
    fn new(name: &str, members: BTreeSet<String>) -> Self {
        let phase = if members.is_empty() {
            Phase::Satisfied
        } else {
            Phase::Open
        };
        let (state, _) = watch::channel(PartitionState {
            pending: members.clone(),
            phase,
        });
        Self {
            name: name.to_string(),
            members,
            state,
        }
    }

    /// Release everyone still waiting without satisfying the barrier.
    fn abandon(&self) {
        let mut left_pending = Vec::new();
        let abandoned = self.state.send_if_modified(|s| {
            if s.phase != Phase::Open {
                return false;
            }
            s.phase = Phase::Abandoned;
            left_pending = s.pending.iter().cloned().collect();
            true
        });
        if abandoned {
            warn!(
                partition = %self.name,
                pending = ?left_pending,
                "partition abandoned with members still pending"
            );
        }
    }
}

/// Registry of named partitions.
///
/// Clones share the same partitions.
#[derive(Debug, Clone, Default)]
pub struct PartitionBarrier {
    partitions: Arc<DashMap<String, Arc<Partition>>>,
}

impl PartitionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create partition `name` expecting every member in `members`.
    ///
    /// An existing partition of the same name is abandoned and replaced.
    pub fn create_partition<I, S>(&self, name: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: BTreeSet<String> = members.into_iter().map(Into::into).collect();
        let partition = Arc::new(Partition::new(name, members));
        info!(partition = %name, members = ?partition.members, "created partition");

        if let Some(previous) = self.partitions.insert(name.to_string(), partition) {
            debug!(partition = %name, "replacing existing partition");
            previous.abandon();
        }
    }

    /// Join partition `name` as `member` and wait for the others.
    pub async fn join(&self, name: &str, member: &str) -> JoinOutcome {
        self.join_inner(name, member, None::<fn(&[String])>).await
    }

    /// Like [`join`](Self::join), but call `on_would_block` with the members
    /// still pending when this join has to wait.
    pub async fn join_with<F>(&self, name: &str, member: &str, on_would_block: F) -> JoinOutcome
    where
        F: FnOnce(&[String]),
    {
        self.join_inner(name, member, Some(on_would_block)).await
    }

    /// Like [`join`](Self::join), but give up after `timeout`.
    ///
    /// On timeout the member counts as not joined again and
    /// [`DeploydagError::Interrupted`] is returned.
    pub async fn join_timeout(
        &self,
        name: &str,
        member: &str,
        timeout: Duration,
    ) -> Result<JoinOutcome> {
        tokio::time::timeout(timeout, self.join(name, member))
            .await
            .map_err(|_| {
                DeploydagError::Interrupted(format!(
                    "timed out after {timeout:?} waiting at partition '{name}' as '{member}'"
                ))
            })
    }

    /// Abandon and discard partition `name`. Returns whether it existed.
    pub fn remove_partition(&self, name: &str) -> bool {
        match self.partitions.remove(name) {
            Some((_, partition)) => {
                partition.abandon();
                debug!(partition = %name, "removed partition");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partitions.contains_key(name)
    }

    /// Members of `name` that have not joined yet.
    pub fn pending_members(&self, name: &str) -> Option<Vec<String>> {
        self.partitions
            .get(name)
            .map(|p| p.state.borrow().pending.iter().cloned().collect())
    }

    /// The full member set `name` was created with.
    pub fn members(&self, name: &str) -> Option<Vec<String>> {
        self.partitions
            .get(name)
            .map(|p| p.members.iter().cloned().collect())
    }

    async fn join_inner<F>(&self, name: &str, member: &str, on_would_block: Option<F>) -> JoinOutcome
    where
        F: FnOnce(&[String]),
    {
        let Some(partition) = self.partitions.get(name).map(|p| Arc::clone(p.value())) else {
            debug!(partition = %name, member = %member, "join on unknown partition; ignoring");
            return JoinOutcome::UnknownPartition;
        };

        let mut rx = partition.state.subscribe();
        let mut removed = false;
        let mut still_pending = Vec::new();
        let mut finished = None;

        partition.state.send_if_modified(|s| match s.phase {
            Phase::Satisfied => {
                finished = Some(JoinOutcome::Satisfied);
                false
            }
            Phase::Abandoned => {
                finished = Some(JoinOutcome::Abandoned);
                false
            }
            Phase::Open => {
                removed = s.pending.remove(member);
                if s.pending.is_empty() {
                    s.phase = Phase::Satisfied;
                    finished = Some(JoinOutcome::Satisfied);
                } else {
                    still_pending = s.pending.iter().cloned().collect();
                }
                removed
            }
        });

        if let Some(outcome) = finished {
            if removed {
                info!(partition = %name, member = %member, "last member joined; partition satisfied");
            }
            return outcome;
        }

        if !removed {
            warn!(
                partition = %name,
                member = %member,
                "member is not pending in partition; waiting anyway"
            );
        }
        if let Some(callback) = on_would_block {
            callback(&still_pending);
        }
        debug!(partition = %name, member = %member, pending = ?still_pending, "waiting at partition");

        let rejoin = RejoinOnDrop {
            partition: &partition,
            member,
            armed: removed,
        };
        let phase = rx
            .wait_for(|s| s.phase != Phase::Open)
            .await
            .map(|s| s.phase);
        rejoin.disarm();

        match phase {
            Ok(Phase::Satisfied) => JoinOutcome::Satisfied,
            _ => JoinOutcome::Abandoned,
        }
    }
}

/// Puts a member back into the pending set if its join is dropped mid-wait.
struct RejoinOnDrop<'a> {
    partition: &'a Partition,
    member: &'a str,
    armed: bool,
}

impl RejoinOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RejoinOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let restored = self.partition.state.send_if_modified(|s| {
            s.phase == Phase::Open && s.pending.insert(self.member.to_string())
        });
        if restored {
            debug!(
                partition = %self.partition.name,
                member = %self.member,
                "join abandoned by caller; member pending again"
            );
        }
    }
}
