// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeploydagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Every node that could not be ordered: members of a cycle and
    /// everything downstream of one.
    #[error("Cycle detected in DAG; outstanding nodes: {}", .outstanding.join(", "))]
    DagCycle { outstanding: Vec<String> },

    #[error("Task '{task}' not run: dependency '{dependency}' failed")]
    DependencyFailed { task: String, dependency: String },

    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task '{0}' already failed in an earlier execution")]
    TaskAlreadyFailed(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Acquire/release imbalance on key '{key}'")]
    LockImbalance { key: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeploydagError {
    /// Whether this error means the task never ran because something upstream
    /// failed, as opposed to its own work failing.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, DeploydagError::DependencyFailed { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DeploydagError>;
