// tests/scheduler_execution.rs

mod common;
use crate::common::builders::position;
use crate::common::{
    assert_blocks, fails, init_tracing, records, with_timeout, ConcurrencyProbe, WorkLog,
};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deploydag::engine::{run_all, DependencyScheduler, TaskState};
use deploydag::errors::DeploydagError;
use tokio::sync::Notify;

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(4);
    for name in ["fetch", "build", "deploy"] {
        s.define_task(name, (), records(&log, name));
    }
    s.add_dependency("build", ["fetch"]);
    s.add_dependency("deploy", ["build"]);
    let s = Arc::new(s);

    // spawn in reverse so ordering comes from the scheduler, not the caller
    let mut handles = Vec::new();
    for name in ["deploy", "build", "fetch"] {
        let s = Arc::clone(&s);
        handles.push(tokio::spawn(async move { s.execute(name).await }));
    }
    for h in handles {
        with_timeout(h).await.unwrap().unwrap();
    }

    assert_eq!(log.executed(), vec!["fetch", "build", "deploy"]);
    for name in ["fetch", "build", "deploy"] {
        assert_eq!(s.state_of(name), Some(TaskState::Succeeded));
    }
}

#[tokio::test]
async fn failed_dependency_blocks_dependent_without_running_it() {
    init_tracing();
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(2);
    s.define_task("A", (), fails(&log, "A"));
    s.define_task("B", (), records(&log, "B"));
    s.add_dependency("B", ["A"]);

    let err = s.execute("A").await.unwrap_err();
    match &err {
        DeploydagError::TaskFailed { task, source } => {
            assert_eq!(task, "A");
            assert_eq!(source.to_string(), "A exploded");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }

    match s.execute("B").await {
        Err(DeploydagError::DependencyFailed { task, dependency }) => {
            assert_eq!(task, "B");
            assert_eq!(dependency, "A");
        }
        other => panic!("expected DependencyFailed, got {other:?}"),
    }

    assert!(!log.ran("B"));
    assert_eq!(s.state_of("A"), Some(TaskState::Failed));
    assert_eq!(s.state_of("B"), Some(TaskState::Failed));
}

#[tokio::test]
async fn failure_propagates_transitively() {
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(2);
    s.define_task("a", (), fails(&log, "a"));
    s.define_task("b", (), records(&log, "b"));
    s.define_task("c", (), records(&log, "c"));
    s.add_dependency("b", ["a"]);
    s.add_dependency("c", ["b"]);

    let _ = s.execute("a").await;
    assert!(s.execute("b").await.unwrap_err().is_dependency_failure());
    match s.execute("c").await {
        Err(DeploydagError::DependencyFailed { dependency, .. }) => assert_eq!(dependency, "b"),
        other => panic!("expected DependencyFailed, got {other:?}"),
    }
    assert_eq!(log.executed(), vec!["a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dependent_started_first_waits_for_dependency() {
    init_tracing();
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(2);
    s.define_task("A", (), records(&log, "A"));
    s.define_task("B", (), records(&log, "B"));
    s.add_dependency("B", ["A"]);
    let s = Arc::new(s);

    let waiting = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("B").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(s.state_of("B"), Some(TaskState::Pending));
    assert!(log.executed().is_empty());

    s.execute("A").await.unwrap();
    with_timeout(waiting).await.unwrap().unwrap();

    assert_eq!(log.executed(), vec!["A", "B"]);
}

#[tokio::test]
async fn unknown_task_is_reported() {
    let s: DependencyScheduler<()> = DependencyScheduler::new(1);
    match s.execute("ghost").await {
        Err(DeploydagError::TaskNotFound(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
    assert_eq!(s.state_of("ghost"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admission_bounds_concurrent_work() {
    init_tracing();
    let probe = ConcurrencyProbe::new();
    let mut s = DependencyScheduler::new(3);
    for i in 0..10 {
        let probe = probe.clone();
        s.define_task(&format!("step-{i}"), i, move |_| {
            let probe = probe.clone();
            async move {
                let _inside = probe.enter();
                tokio::time::sleep(Duration::from_millis(20)).await;
                anyhow::Ok(())
            }
        });
    }

    let report = with_timeout(run_all(Arc::new(s))).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 10);
    assert!(probe.peak() <= 3, "peak {} exceeded capacity", probe.peak());
    assert!(probe.peak() > 1, "independent tasks never overlapped");
    assert_eq!(probe.active(), 0);
}

#[tokio::test]
async fn run_all_sorts_outcomes_into_report() {
    init_tracing();
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(2);
    s.define_task("migrate", (), fails(&log, "migrate"));
    s.define_task("restart", (), records(&log, "restart"));
    s.define_task("smoke", (), records(&log, "smoke"));
    s.define_task("lint", (), records(&log, "lint"));
    s.add_dependency("restart", ["migrate"]);
    s.add_dependency("smoke", ["restart"]);

    let report = with_timeout(run_all(Arc::new(s))).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.succeeded, vec!["lint"]);
    assert_eq!(report.failed_names().collect::<Vec<_>>(), vec!["migrate"]);
    assert!(matches!(
        report.failed[0].1,
        DeploydagError::TaskFailed { .. }
    ));
    assert_eq!(report.blocked, vec!["restart", "smoke"]);
    assert!(!log.ran("restart") && !log.ran("smoke"));
}

#[tokio::test]
async fn run_all_rejects_cycles_before_running_anything() {
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(2);
    for name in ["x", "y", "z"] {
        s.define_task(name, (), records(&log, name));
    }
    s.add_dependency("x", ["y"]);
    s.add_dependency("y", ["x"]);
    s.add_dependency("z", ["y"]);

    match run_all(Arc::new(s)).await {
        Err(DeploydagError::DagCycle { mut outstanding }) => {
            outstanding.sort();
            assert_eq!(outstanding, vec!["x", "y", "z"]);
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }
    assert!(log.executed().is_empty());
}

#[tokio::test]
async fn second_execute_does_not_rerun_work() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut s = DependencyScheduler::new(1);
    {
        let runs = Arc::clone(&runs);
        s.define_task("once", (), move |_| {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        });
    }
    let log = WorkLog::new();
    s.define_task("broken", (), fails(&log, "broken"));

    s.execute("once").await.unwrap();
    s.execute("once").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert!(s.execute("broken").await.is_err());
    match s.execute("broken").await {
        Err(DeploydagError::TaskAlreadyFailed(name)) => assert_eq!(name, "broken"),
        other => panic!("expected TaskAlreadyFailed, got {other:?}"),
    }
    assert_eq!(log.executed(), vec!["broken"]);
}

/// Scheduler with capacity 1 whose `hold` task occupies the only slot until
/// `gate` is notified.
fn gated_scheduler(gate: &Arc<Notify>, log: &WorkLog) -> Arc<DependencyScheduler<()>> {
    let mut s = DependencyScheduler::new(1);
    let gate = Arc::clone(gate);
    s.define_task("hold", (), move |_| {
        let gate = Arc::clone(&gate);
        async move {
            gate.notified().await;
            anyhow::Ok(())
        }
    });
    s.define_task("next", (), records(log, "next"));
    Arc::new(s)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_execute_waiting_for_admission_leaves_task_pending() {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let log = WorkLog::new();
    let s = gated_scheduler(&gate, &log);

    let holder = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("hold").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(s.available_slots(), 0);

    assert_blocks(s.execute("next"), 50).await;
    assert_eq!(s.state_of("next"), Some(TaskState::Pending));
    assert!(!log.ran("next"));

    gate.notify_one();
    with_timeout(holder).await.unwrap().unwrap();
    with_timeout(s.execute("next")).await.unwrap();
    assert_eq!(s.state_of("next"), Some(TaskState::Succeeded));
    assert_eq!(s.available_slots(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_execute_during_work_marks_task_failed() {
    let gate = Arc::new(Notify::new());
    let log = WorkLog::new();
    let s = gated_scheduler(&gate, &log);

    assert_blocks(s.execute("hold"), 50).await;
    assert_eq!(s.state_of("hold"), Some(TaskState::Failed));
    assert_eq!(s.available_slots(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_execute_takes_over_a_claim_dropped_before_admission() {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let log = WorkLog::new();
    let s = gated_scheduler(&gate, &log);

    let holder = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("hold").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let first = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("next").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(s.state_of("next"), Some(TaskState::Running));

    let second = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("next").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_millis(20)).await;
    // the second call holds the claim now and waits for the slot
    assert_eq!(s.state_of("next"), Some(TaskState::Running));

    gate.notify_one();
    with_timeout(holder).await.unwrap().unwrap();
    with_timeout(second).await.unwrap().unwrap();

    assert_eq!(s.state_of("next"), Some(TaskState::Succeeded));
    assert_eq!(log.executed(), vec!["next"]);
    assert_eq!(s.available_slots(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_interrupts_tasks_waiting_for_admission() {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let log = WorkLog::new();
    let s = gated_scheduler(&gate, &log);

    let holder = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("hold").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let waiter = {
        let s = Arc::clone(&s);
        tokio::spawn(async move { s.execute("next").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(s.state_of("next"), Some(TaskState::Running));

    s.shutdown();
    match with_timeout(waiter).await.unwrap() {
        Err(DeploydagError::Interrupted(_)) => {}
        other => panic!("expected Interrupted, got {other:?}"),
    }
    assert_eq!(s.state_of("next"), Some(TaskState::Failed));
    assert!(!log.ran("next"));

    // work that already had a slot finishes normally
    gate.notify_one();
    with_timeout(holder).await.unwrap().unwrap();
    assert_eq!(s.state_of("hold"), Some(TaskState::Succeeded));
}

#[tokio::test]
async fn work_receives_its_payload() {
    #[derive(Debug)]
    struct Target {
        host: String,
        port: u16,
    }

    let seen = Arc::new(std::sync::Mutex::new(None));
    let mut s = DependencyScheduler::new(1);
    {
        let seen = Arc::clone(&seen);
        s.define_task(
            "connect",
            Target {
                host: "db1".to_string(),
                port: 5432,
            },
            move |target: Arc<Target>| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = Some(format!("{}:{}", target.host, target.port));
                    anyhow::Ok(())
                }
            },
        );
    }

    s.execute("connect").await.unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("db1:5432"));
    assert_eq!(s.graph().node_data("connect").unwrap().payload().host, "db1");
}

#[test]
fn topological_order_lists_dependencies_first() {
    let log = WorkLog::new();
    let mut s = DependencyScheduler::new(1);
    for name in ["deploy", "build", "fetch"] {
        s.define_task(name, (), records(&log, name));
    }
    s.add_dependency("deploy", ["build"]);
    s.add_dependency("build", ["fetch"]);

    let order = s.topological_order().unwrap();
    assert!(position(&order, "fetch") < position(&order, "build"));
    assert!(position(&order, "build") < position(&order, "deploy"));
    assert_eq!(s.task_names().count(), 3);
}
