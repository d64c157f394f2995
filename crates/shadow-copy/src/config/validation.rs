//! Configuration validation.

use std::time::Duration;

use super::CopyConfig;
use crate::error::{CopyError, Result};

/// Validate the configuration.
pub fn validate(config: &CopyConfig) -> Result<()> {
    if let Some(db) = &config.database {
        if db.host.is_empty() {
            return Err(CopyError::Config("database.host is required".into()));
        }
        if db.database.is_empty() {
            return Err(CopyError::Config("database.database is required".into()));
        }
        if db.user.is_empty() {
            return Err(CopyError::Config("database.user is required".into()));
        }
    }

    let copy = &config.copy;
    if copy.stride == 0 {
        return Err(CopyError::Config("copy.stride must be at least 1".into()));
    }
    if let (Some(start), Some(limit)) = (copy.start, copy.limit) {
        if start > limit {
            return Err(CopyError::Config(format!(
                "copy.start ({}) must not be greater than copy.limit ({})",
                start, limit
            )));
        }
    }

    let retry = &config.retry;
    if retry.tries == 0 {
        return Err(CopyError::Config("retry.tries must be at least 1".into()));
    }
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        return Err(CopyError::Config(format!(
            "retry.multiplier must be at least 1.0, got {}",
            retry.multiplier
        )));
    }
    if !(0.0..=1.0).contains(&retry.rand_factor) {
        return Err(CopyError::Config(format!(
            "retry.rand_factor must be between 0.0 and 1.0, got {}",
            retry.rand_factor
        )));
    }
    check_seconds("retry.base_interval_secs", retry.base_interval_secs)?;
    check_seconds("retry.max_interval_secs", retry.max_interval_secs)?;
    if let Some(max_elapsed) = retry.max_elapsed_time_secs {
        check_seconds("retry.max_elapsed_time_secs", max_elapsed)?;
    }

    Ok(())
}

/// Seconds must be non-negative and fit in a `Duration`.
fn check_seconds(field: &str, secs: f64) -> Result<()> {
    if Duration::try_from_secs_f64(secs).is_err() {
        return Err(CopyError::Config(format!(
            "{} must be a non-negative number of seconds that fits in a duration, got {}",
            field, secs
        )));
    }
    Ok(())
}
