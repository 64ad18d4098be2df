// src/config/validate.rs

use tokio::sync::Semaphore;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DeploydagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DeploydagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.scheduler, raw.logging, raw.limits))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_limits(cfg)?;
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let capacity = cfg.scheduler.admission_capacity;
    if capacity == 0 {
        return Err(DeploydagError::ConfigError(
            "[scheduler].admission_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    if capacity > Semaphore::MAX_PERMITS {
        return Err(DeploydagError::ConfigError(format!(
            "[scheduler].admission_capacity must be <= {} (got {capacity})",
            Semaphore::MAX_PERMITS
        )));
    }
    Ok(())
}

fn validate_limits(cfg: &RawConfigFile) -> Result<()> {
    for (name, limit) in cfg.limits.iter() {
        if name.trim().is_empty() {
            return Err(DeploydagError::ConfigError(
                "[limits] entry names must not be empty".to_string(),
            ));
        }
        if *limit == 0 {
            return Err(DeploydagError::ConfigError(format!(
                "[limits].{name} must be >= 1 (got 0)"
            )));
        }
        if *limit > Semaphore::MAX_PERMITS {
            return Err(DeploydagError::ConfigError(format!(
                "[limits].{name} must be <= {} (got {limit})",
                Semaphore::MAX_PERMITS
            )));
        }
    }
    Ok(())
}
