// src/engine/driver.rs

//! Fan-out driver: one tokio task per scheduled task.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::scheduler::DependencyScheduler;
use crate::engine::TaskName;
use crate::errors::{DeploydagError, Result};

/// Outcome of [`run_all`], with names sorted alphabetically.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Tasks whose work completed successfully.
    pub succeeded: Vec<TaskName>,
    /// Tasks whose own work failed or was aborted, with the error.
    pub failed: Vec<(TaskName, DeploydagError)>,
    /// Tasks that never ran because a dependency failed.
    pub blocked: Vec<TaskName>,
}

impl RunReport {
    /// Whether every task succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    pub fn failed_names(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|(name, _)| name.as_str())
    }

    fn sort(&mut self) {
        self.succeeded.sort();
        self.blocked.sort();
        self.failed.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

/// Execute every task of `scheduler`, each on its own tokio task.
///
/// Tasks are spawned in topological order; ordering between them is then
/// enforced by `execute` itself and concurrency by the scheduler's admission
/// gate. A cyclic graph fails before anything is spawned.
pub async fn run_all<P>(scheduler: Arc<DependencyScheduler<P>>) -> Result<RunReport>
where
    P: Send + Sync + 'static,
{
    let order = scheduler.topological_order()?;
    info!(
        tasks = order.len(),
        capacity = scheduler.capacity(),
        "starting orchestration run"
    );

    let mut set = JoinSet::new();
    for name in order {
        let scheduler = Arc::clone(&scheduler);
        set.spawn(async move {
            let outcome = scheduler.execute(&name).await;
            (name, outcome)
        });
    }

    let mut report = RunReport::default();
    while let Some(joined) = set.join_next().await {
        let (name, outcome) = joined.map_err(|e| anyhow!("task runner failed to join: {e}"))?;
        match outcome {
            Ok(()) => report.succeeded.push(name),
            Err(e) if e.is_dependency_failure() => {
                debug!(task = %name, error = %e, "task blocked by failed dependency");
                report.blocked.push(name);
            }
            Err(e) => report.failed.push((name, e)),
        }
    }
    report.sort();

    if report.is_success() {
        info!(succeeded = report.succeeded.len(), "orchestration run finished");
    } else {
        warn!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            "orchestration run finished with failures"
        );
    }

    Ok(report)
}
