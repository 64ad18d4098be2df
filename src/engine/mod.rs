// src/engine/mod.rs

//! Dependency-aware task execution.
//!
//! - [`scheduler`] holds the [`DependencyScheduler`]: named tasks, dependency
//!   arcs, and `execute` which waits on direct predecessors and a fair
//!   admission gate before running a task's work.
//! - [`status`] holds the per-task [`ExecutionStatus`] record and its
//!   wake-all monitor.
//! - [`driver`] fans a whole scheduler out over tokio tasks.
//!
//! The scheduler never spawns anything on its own; callers decide which task
//! runs where and call `execute` themselves, or use [`driver::run_all`].

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Lifecycle of a task within one orchestration run.
///
/// A task leaves `Pending` at most once and, once terminal, never changes
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not started yet.
    Pending,
    /// Claimed by an `execute` call: waiting for admission or running.
    Running,
    /// Work completed successfully.
    Succeeded,
    /// Work failed, was aborted, or a dependency failed.
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

pub mod driver;
pub mod scheduler;
pub mod status;

pub use driver::{run_all, RunReport};
pub use scheduler::{DependencyScheduler, DEFAULT_ADMISSION_CAPACITY};
pub use status::{ExecutionStatus, WorkFuture};
