//! Retry rules and backoff schedule.

use std::sync::OnceLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;

use crate::config::RetryConfig;
use crate::error::{CopyError, ErrorKind, Result};

/// Messages the MySQL client reports for transient conditions. The driver
/// surfaces most of these under the same error type, so the text decides.
const TRANSIENT_SQL_MESSAGES: &[&str] = &[
    "Lock wait timeout exceeded",
    "Timeout waiting for a response from the last query",
    "Deadlock found when trying to get lock",
    "Query execution was interrupted",
    "Lost connection to MySQL server during query",
    "Max connect timeout reached",
    "Unknown MySQL server host",
];

const HOST_DIVERGENCE_MESSAGE: &str = "Different MySQL server host than the initial host";

/// Errors after which the session may have been re-established elsewhere.
const RECONNECT_MESSAGES: &[&str] = &[
    "Lost connection to MySQL server",
    "MySQL server has gone away",
    "Max connect timeout reached",
    "Unknown MySQL server host",
];

/// An error kind plus a message pattern that together make an error retryable.
#[derive(Debug, Clone)]
pub struct RetryRule {
    pub kind: ErrorKind,
    pub pattern: Regex,
}

impl RetryRule {
    /// Build a rule from a regular expression.
    pub fn new(kind: ErrorKind, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            CopyError::Config(format!("invalid retry pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self { kind, pattern })
    }

    /// Build a rule matching a literal message fragment.
    pub fn literal(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            pattern: literal_regex(message),
        }
    }

    pub fn matches(&self, error: &CopyError) -> bool {
        self.kind == error.kind() && self.pattern.is_match(&error.to_string())
    }
}

fn literal_regex(message: &str) -> Regex {
    Regex::new(&regex::escape(message)).expect("escaped literal is a valid pattern")
}

/// Rules applied when nothing else is configured.
pub fn default_rules() -> &'static [RetryRule] {
    static RULES: OnceLock<Vec<RetryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        TRANSIENT_SQL_MESSAGES
            .iter()
            .map(|message| RetryRule::literal(ErrorKind::Sql, message))
            .chain(std::iter::once(RetryRule::literal(
                ErrorKind::HostDivergence,
                HOST_DIVERGENCE_MESSAGE,
            )))
            .collect()
    })
}

/// Whether the session behind `error` may now point at a different server.
pub(crate) fn requires_host_check(error: &CopyError) -> bool {
    if error.kind() == ErrorKind::HostDivergence {
        return true;
    }
    let message = error.to_string();
    RECONNECT_MESSAGES.iter().any(|m| message.contains(m))
}

/// Which errors are retried and how long to wait between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Errors matching any rule are retried.
    pub rules: Vec<RetryRule>,
    /// Growth factor applied to the interval after every retry.
    pub multiplier: f64,
    /// Interval before the first retry.
    pub base_interval: Duration,
    /// Upper bound for a single interval.
    pub max_interval: Duration,
    /// Jitter as a fraction of the interval (0 disables it).
    pub rand_factor: f64,
    /// Total attempts, including the first one.
    pub tries: u32,
    /// Give up once the next retry would end after this much time. `None` is unlimited.
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rules: default_rules().to_vec(),
            multiplier: 1.0,
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            rand_factor: 0.0,
            tries: 20,
            max_elapsed_time: None,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from configuration, on top of the default rules.
    pub fn from_config(config: &RetryConfig) -> Result<Self> {
        let mut rules = default_rules().to_vec();
        for pattern in &config.extra_patterns {
            rules.push(RetryRule::new(ErrorKind::Sql, pattern)?);
        }

        Ok(Self {
            rules,
            multiplier: config.multiplier,
            base_interval: seconds("base_interval_secs", config.base_interval_secs)?,
            max_interval: seconds("max_interval_secs", config.max_interval_secs)?,
            rand_factor: config.rand_factor,
            tries: config.tries,
            max_elapsed_time: config
                .max_elapsed_time_secs
                .map(|secs| seconds("max_elapsed_time_secs", secs))
                .transpose()?,
        })
    }

    /// Apply per-call overrides. Anything set on `overrides` wins.
    pub fn merge(&self, overrides: &RetryOverrides) -> RetryPolicy {
        RetryPolicy {
            rules: overrides.rules.clone().unwrap_or_else(|| self.rules.clone()),
            multiplier: overrides.multiplier.unwrap_or(self.multiplier),
            base_interval: overrides.base_interval.unwrap_or(self.base_interval),
            max_interval: overrides.max_interval.unwrap_or(self.max_interval),
            rand_factor: overrides.rand_factor.unwrap_or(self.rand_factor),
            tries: overrides.tries.unwrap_or(self.tries),
            max_elapsed_time: overrides.max_elapsed_time.or(self.max_elapsed_time),
        }
    }

    pub fn is_retryable(&self, error: &CopyError) -> bool {
        self.rules.iter().any(|rule| rule.matches(error))
    }

    /// Nominal wait after the given failed attempt (1-based), before jitter.
    pub fn interval(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.base_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(Duration::ZERO)
    }

    /// Wait after the given failed attempt, with jitter applied.
    pub fn next_interval(&self, attempt: u32) -> Duration {
        let interval = self.interval(attempt);
        if self.rand_factor <= 0.0 || interval.is_zero() {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = self.rand_factor * secs;
        let low = (secs - delta).max(0.0);
        let high = secs + delta;
        Duration::try_from_secs_f64(rand::thread_rng().gen_range(low..=high)).unwrap_or(interval)
    }
}

/// Convert a configured number of seconds, rejecting negative, NaN and out-of-range values.
fn seconds(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| CopyError::Config(format!("retry.{} ({}) is not a valid duration: {}", field, secs, e)))
}

/// Per-call adjustments merged onto a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryOverrides {
    /// Prefix for retry log lines. Defaults to `SQL Retry`.
    pub log_prefix: Option<String>,
    pub rules: Option<Vec<RetryRule>>,
    pub multiplier: Option<f64>,
    pub base_interval: Option<Duration>,
    pub max_interval: Option<Duration>,
    pub rand_factor: Option<f64>,
    pub tries: Option<u32>,
    pub max_elapsed_time: Option<Duration>,
}

impl RetryOverrides {
    /// Overrides that only set the log prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            log_prefix: Some(prefix.into()),
            ..Default::default()
        }
    }

    /// Copy of these overrides with a different log prefix.
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            log_prefix: Some(prefix.to_string()),
            ..self.clone()
        }
    }
}
