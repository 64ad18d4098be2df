// src/engine/status.rs

//! Per-task execution record.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::engine::TaskState;
use crate::errors::{DeploydagError, Result};

/// Boxed future returned by a task's work function.
pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub(crate) type WorkFn<P> = Arc<dyn Fn(Arc<P>) -> WorkFuture + Send + Sync>;

/// Work function, payload and state of one scheduled task.
///
/// The state lives in a `watch` channel: every `execute` call blocked on this
/// task subscribes to it and is woken on each transition.
pub struct ExecutionStatus<P> {
    work: WorkFn<P>,
    payload: Arc<P>,
    state: watch::Sender<TaskState>,
}

impl<P> fmt::Debug for ExecutionStatus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStatus")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<P> ExecutionStatus<P> {
    pub(crate) fn new(payload: P, work: WorkFn<P>) -> Self {
        let (state, _) = watch::channel(TaskState::Pending);
        Self {
            work,
            payload: Arc::new(payload),
            state,
        }
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Start the work function on a shared handle to the payload.
    pub(crate) fn run(&self) -> WorkFuture {
        (self.work)(Arc::clone(&self.payload))
    }

    /// Wait until the task is `Succeeded` or `Failed`.
    pub(crate) async fn wait_terminal(&self) -> Result<TaskState> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| DeploydagError::Interrupted("task state monitor closed".to_string()))?;
        Ok(*state)
    }

    /// Wait until no `execute` call holds a claim on the task.
    ///
    /// Returns `Pending` if the claim was dropped before the work started,
    /// otherwise the terminal state.
    pub(crate) async fn wait_unclaimed(&self) -> Result<TaskState> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != TaskState::Running)
            .await
            .map_err(|_| DeploydagError::Interrupted("task state monitor closed".to_string()))?;
        Ok(*state)
    }

    /// Move from `from` to `to`; returns `false` (and changes nothing) if the
    /// task is not currently in `from`.
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        })
    }
}
