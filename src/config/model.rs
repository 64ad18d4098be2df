// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::coord::KeyedLock;
use crate::engine::DEFAULT_ADMISSION_CAPACITY;
use crate::errors::{DeploydagError, Result};
use crate::types::LogLevel;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [scheduler]
/// admission_capacity = 8
///
/// [logging]
/// level = "debug"
///
/// [limits]
/// container-start = 4
/// registry-api = 2
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub logging: LoggingSection,

    /// Named bounded-admission families and their per-key holder limit.
    #[serde(default)]
    pub limits: BTreeMap<String, usize>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` or the
/// loader functions, so every instance has passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub logging: LoggingSection,
    pub limits: BTreeMap<String, usize>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerSection,
        logging: LoggingSection,
        limits: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            scheduler,
            logging,
            limits,
        }
    }

    /// Build a bounded-admission lock for the limit family `family`.
    pub fn bounded_lock(&self, family: &str) -> Result<KeyedLock> {
        let limit = self.limits.get(family).ok_or_else(|| {
            DeploydagError::ConfigError(format!("no [limits] entry named '{family}'"))
        })?;
        Ok(KeyedLock::bounded(*limit))
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        Self::new_unchecked(raw.scheduler, raw.logging, raw.limits)
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Maximum number of task work functions running at once.
    #[serde(default = "default_admission_capacity")]
    pub admission_capacity: usize,
}

fn default_admission_capacity() -> usize {
    DEFAULT_ADMISSION_CAPACITY
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            admission_capacity: default_admission_capacity(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    /// If `None`, `DEPLOYDAG_LOG` or `info` is used.
    #[serde(default)]
    pub level: Option<LogLevel>,
}
