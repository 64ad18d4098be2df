// src/lib.rs

//! Coordination core for multi-step, multi-host deployments.
//!
//! - [`dag`]: a generic directed graph with topological ordering and
//!   visitor-driven traversals.
//! - [`engine`]: the dependency-aware [`DependencyScheduler`] and a fan-out
//!   driver.
//! - [`coord`]: keyed locks, keyed counters and partition barriers for
//!   orchestration code running deployment branches in parallel.
//! - [`config`]: TOML configuration for the tunables above.
//!
//! Everything here coordinates tokio tasks inside one process.

pub mod config;
pub mod coord;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod types;

pub use coord::{JoinOutcome, KeyedCounter, KeyedLock, KeyedRwLock, PartitionBarrier};
pub use dag::DirectedGraph;
pub use engine::{run_all, DependencyScheduler, RunReport, TaskState};
pub use errors::{DeploydagError, Result};
