#![allow(dead_code)]

pub use deploydag_test_utils::builders;
pub use deploydag_test_utils::probe::{ConcurrencyProbe, WorkLog};
pub use deploydag_test_utils::{assert_blocks, init_tracing, with_timeout};

use std::sync::Arc;

use anyhow::anyhow;
use deploydag::engine::WorkFuture;

/// Work that records `name` in `log` and succeeds.
pub fn records<P>(log: &WorkLog, name: &str) -> impl Fn(Arc<P>) -> WorkFuture + Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    let log = log.clone();
    let name = name.to_string();
    move |_| -> WorkFuture {
        let log = log.clone();
        let name = name.clone();
        Box::pin(async move {
            log.record(&name);
            Ok(())
        })
    }
}

/// Work that records `name` in `log` and then fails.
pub fn fails<P>(log: &WorkLog, name: &str) -> impl Fn(Arc<P>) -> WorkFuture + Send + Sync + 'static
where
    P: Send + Sync + 'static,
{
    let log = log.clone();
    let name = name.to_string();
    move |_| -> WorkFuture {
        let log = log.clone();
        let name = name.clone();
        Box::pin(async move {
            log.record(&name);
            Err(anyhow!("{name} exploded"))
        })
    }
}
