// src/engine/scheduler.rs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::dag::DirectedGraph;
use crate::engine::status::{ExecutionStatus, WorkFn, WorkFuture};
use crate::engine::TaskState;
use crate::errors::{DeploydagError, Result};

/// Admission capacity used when none is configured.
pub const DEFAULT_ADMISSION_CAPACITY: usize = 8;

/// Label stored on every dependency arc.
const DEPENDENCY_LABEL: &str = "after";

/// Scheduler holding the task graph plus the admission gate.
///
/// It is responsible for:
/// - registering tasks and their dependency arcs (setup phase, `&mut self`)
/// - running a task only once every direct predecessor is terminal
/// - failing a task without running it when a predecessor failed
/// - bounding how many work functions run at once across the whole instance
///
/// Arcs point from a dependency to its dependent: `A -> B` means A must
/// finish before B starts. Once shared behind an `Arc`, the graph is frozen.
pub struct DependencyScheduler<P> {
    graph: DirectedGraph<ExecutionStatus<P>, String>,
    /// FIFO-fair gate bounding concurrently running work functions.
    admission: Semaphore,
    capacity: usize,
}

impl<P> std::fmt::Debug for DependencyScheduler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyScheduler")
            .field("tasks", &self.graph.len())
            .field("capacity", &self.capacity)
            .field("available_slots", &self.admission.available_permits())
            .finish()
    }
}

impl<P> DependencyScheduler<P>
where
    P: Send + Sync + 'static,
{
    /// Construct a scheduler running at most `capacity` work functions at once.
    pub fn new(capacity: usize) -> Self {
        let clamped = capacity.clamp(1, Semaphore::MAX_PERMITS);
        if clamped != capacity {
            warn!(
                requested = capacity,
                capacity = clamped,
                "admission capacity out of range; clamping"
            );
        }

        Self {
            graph: DirectedGraph::new(),
            admission: Semaphore::new(clamped),
            capacity: clamped,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_ADMISSION_CAPACITY)
    }

    /// Construct a scheduler from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.scheduler.admission_capacity)
    }

    /// Register a task, or replace the payload and work of an existing one.
    ///
    /// Dependency arcs already recorded for `name` are kept.
    pub fn define_task<F, Fut>(&mut self, name: &str, payload: P, work: F)
    where
        F: Fn(Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let work: WorkFn<P> = Arc::new(move |payload| -> WorkFuture { Box::pin(work(payload)) });

        if self.graph.node_data(name).is_some() {
            debug!(task = %name, "redefining task");
        }
        self.graph.upsert_node(name, ExecutionStatus::new(payload, work));
    }

    /// Make `task` wait for every task in `depends_on`.
    ///
    /// Names that are not registered tasks are skipped, as is the whole call
    /// when `task` itself is not registered. Returns the number of arcs
    /// recorded.
    pub fn add_dependency<I, S>(&mut self, task: &str, depends_on: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.is_task(task) {
            debug!(task = %task, "dependency for unregistered task; ignoring");
            return 0;
        }

        let mut added = 0;
        for dep in depends_on {
            let dep = dep.as_ref();
            if !self.is_task(dep) {
                debug!(task = %task, dep = %dep, "dependency on unregistered task; ignoring");
                continue;
            }
            self.graph
                .add_arc(dep, task, Some(DEPENDENCY_LABEL.to_string()));
            added += 1;
        }
        added
    }

    /// Run `name` once all of its direct predecessors are terminal.
    ///
    /// - If a predecessor failed, `name` is marked failed without running and
    ///   [`DeploydagError::DependencyFailed`] is returned.
    /// - If another call already claimed `name`, this call waits for that
    ///   outcome instead of running the work again. If that claim is dropped
    ///   before the work starts, this call claims and runs the task itself.
    /// - Work failures are returned as [`DeploydagError::TaskFailed`].
    /// - If [`shutdown`](Self::shutdown) closes the admission gate while this
    ///   call waits for a slot, the task is marked `Failed` and
    ///   [`DeploydagError::Interrupted`] is returned. Its dependents then fail
    ///   with [`DeploydagError::DependencyFailed`] instead of waiting forever.
    ///
    /// Dropping the returned future while it waits for a predecessor or for
    /// an admission slot leaves the task `Pending`; dropping it while the work
    /// runs marks the task failed.
    pub async fn execute(&self, name: &str) -> Result<()> {
        let status = self.status(name)?;

        for dep in self.graph.predecessors(name)? {
            let dep_status = self.status(dep)?;
            if dep_status.wait_terminal().await? == TaskState::Failed {
                status.transition(TaskState::Pending, TaskState::Failed);
                warn!(task = %name, dependency = %dep, "dependency failed; not running task");
                return Err(DeploydagError::DependencyFailed {
                    task: name.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }

        // A claim dropped before admission hands the task back as `Pending`;
        // whoever is waiting on it then takes the claim over.
        while !status.transition(TaskState::Pending, TaskState::Running) {
            debug!(task = %name, "task already claimed; waiting for its outcome");
            match status.wait_unclaimed().await? {
                TaskState::Pending => continue,
                TaskState::Succeeded => return Ok(()),
                _ => return Err(DeploydagError::TaskAlreadyFailed(name.to_string())),
            }
        }

        let mut claim = Claim {
            status,
            task: name,
            phase: ClaimPhase::Admitting,
        };

        let _slot = match self.admission.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                claim.finish(TaskState::Failed);
                warn!(task = %name, "admission gate closed; aborting task");
                return Err(DeploydagError::Interrupted(format!(
                    "scheduler shut down while task '{name}' waited for an admission slot"
                )));
            }
        };

        claim.phase = ClaimPhase::Working;
        info!(task = %name, "running task");

        match status.run().await {
            Ok(()) => {
                claim.finish(TaskState::Succeeded);
                info!(task = %name, "task succeeded");
                Ok(())
            }
            Err(source) => {
                claim.finish(TaskState::Failed);
                warn!(task = %name, error = %source, "task failed");
                Err(DeploydagError::TaskFailed {
                    task: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Task names in an order that respects every dependency.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        self.graph.topological_order()
    }

    /// Close the admission gate: calls waiting for a slot, and any later
    /// call reaching the gate, fail with [`DeploydagError::Interrupted`].
    pub fn shutdown(&self) {
        info!("closing scheduler admission gate");
        self.admission.close();
    }

    /// Current state of a task, or `None` if unknown.
    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.graph.node_data(name).map(ExecutionStatus::state)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.node_names()
    }

    /// Read-only view of the task graph, e.g. for traversals.
    pub fn graph(&self) -> &DirectedGraph<ExecutionStatus<P>, String> {
        &self.graph
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admission slots not currently held.
    pub fn available_slots(&self) -> usize {
        self.admission.available_permits()
    }

    fn is_task(&self, name: &str) -> bool {
        self.graph.node_data(name).is_some()
    }

    fn status(&self, name: &str) -> Result<&ExecutionStatus<P>> {
        self.graph
            .node_data(name)
            .ok_or_else(|| DeploydagError::TaskNotFound(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimPhase {
    Admitting,
    Working,
    Done,
}

/// Resolves a claimed task if `execute` is dropped before it finishes.
struct Claim<'a, P> {
    status: &'a ExecutionStatus<P>,
    task: &'a str,
    phase: ClaimPhase,
}

impl<P> Claim<'_, P> {
    fn finish(&mut self, to: TaskState) {
        self.status.transition(TaskState::Running, to);
        self.phase = ClaimPhase::Done;
    }
}

impl<P> Drop for Claim<'_, P> {
    fn drop(&mut self) {
        match self.phase {
            ClaimPhase::Admitting => {
                self.status.transition(TaskState::Running, TaskState::Pending);
                debug!(task = %self.task, "execute dropped while waiting for admission; task back to Pending");
            }
            ClaimPhase::Working => {
                self.status.transition(TaskState::Running, TaskState::Failed);
                warn!(task = %self.task, "execute dropped while task was running; marking Failed");
            }
            ClaimPhase::Done => {}
        }
    }
}
