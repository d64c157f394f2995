//! Configuration type definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyConfig {
    /// MySQL server holding origin and destination tables. Optional when the
    /// caller supplies its own connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    /// Chunking and pacing.
    #[serde(default)]
    pub copy: CopySettings,

    /// Retry policy for every query the engine issues.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// MySQL connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database (schema) name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

/// How chunk boundaries are found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Walk the primary key with offset lookups.
    #[default]
    Range,
    /// Snapshot every primary key up front and copy it in slices.
    IdSet,
}

/// Chunking and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySettings {
    /// Chunk boundary strategy (default: range).
    #[serde(default)]
    pub strategy: ChunkStrategy,

    /// Rows per chunk (default: 2000).
    #[serde(default = "default_stride")]
    pub stride: u64,

    /// Pause between chunks in milliseconds (default: 100).
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// First primary key to copy. Defaults to the origin's minimum id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    /// Last primary key to copy. Defaults to the origin's maximum id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Fail on warnings other than primary key duplicates (default: false).
    #[serde(default)]
    pub raise_on_warnings: bool,

    /// Sleep after the last chunk, before handing over to the table switch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_before_switch_secs: Option<u64>,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            stride: default_stride(),
            throttle_ms: default_throttle_ms(),
            start: None,
            limit: None,
            raise_on_warnings: false,
            pause_before_switch_secs: None,
        }
    }
}

impl CopySettings {
    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn pause_before_switch(&self) -> Option<Duration> {
        self.pause_before_switch_secs.map(Duration::from_secs)
    }
}

/// Retry settings. The defaults retry every second, up to 20 attempts, with
/// no overall deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Interval growth factor (default: 1.0, i.e. constant).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Interval before the first retry in seconds (default: 1.0).
    #[serde(default = "default_base_interval_secs")]
    pub base_interval_secs: f64,

    /// Cap for a single interval in seconds (default: 60.0).
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: f64,

    /// Jitter as a fraction of the interval (default: 0.0).
    #[serde(default)]
    pub rand_factor: f64,

    /// Attempts including the first one (default: 20).
    #[serde(default = "default_tries")]
    pub tries: u32,

    /// Overall retry deadline in seconds (default: unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elapsed_time_secs: Option<f64>,

    /// Extra error message patterns (regular expressions) to retry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            base_interval_secs: default_base_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            rand_factor: 0.0,
            tries: default_tries(),
            max_elapsed_time_secs: None,
            extra_patterns: Vec::new(),
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_stride() -> u64 {
    2_000
}

fn default_throttle_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_base_interval_secs() -> f64 {
    1.0
}

fn default_max_interval_secs() -> f64 {
    60.0
}

fn default_tries() -> u32 {
    20
}
