use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the dynamic scheduler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Status monitor configuration
    #[serde(default)]
    pub status_monitor: StatusMonitorConfig,

    /// Workflow runner configuration
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// `SQLite` connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite:.dynamic-scheduler/scheduler.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix for every key written by the scheduler
    #[serde(default = "default_redis_namespace")]
    pub namespace: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_namespace() -> String {
    "dynamic_scheduler".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            namespace: default_redis_namespace(),
        }
    }
}

/// Status monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusMonitorConfig {
    /// Interval between background refresh sweeps in milliseconds
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Lifetime of a cached status in milliseconds
    #[serde(default = "default_status_ttl_ms")]
    pub status_ttl_ms: u64,

    /// Maximum concurrent status fetches during a sweep. Has no default,
    /// deployments must choose it.
    #[serde(default)]
    pub max_parallel_updates: Option<usize>,

    /// Lifetime of the sweep lease in milliseconds
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
}

const fn default_refresh_interval_ms() -> u64 {
    5_000
}

const fn default_status_ttl_ms() -> u64 {
    60_000
}

const fn default_lease_ttl_ms() -> u64 {
    15_000
}

impl StatusMonitorConfig {
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub const fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }

    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }
}

impl Default for StatusMonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            status_ttl_ms: default_status_ttl_ms(),
            max_parallel_updates: None,
            lease_ttl_ms: default_lease_ttl_ms(),
        }
    }
}

/// Workflow runner configuration, applied to steps that do not set their own
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerSettings {
    /// Per-attempt timeout in milliseconds, unset means no timeout
    #[serde(default)]
    pub default_step_timeout_ms: Option<u64>,

    /// Retries after the first failed attempt
    #[serde(default)]
    pub default_retries: u32,

    /// Pause between attempts in milliseconds
    #[serde(default = "default_wait_between_attempts_ms")]
    pub wait_between_attempts_ms: u64,
}

const fn default_wait_between_attempts_ms() -> u64 {
    5_000
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: None,
            default_retries: 0,
            wait_between_attempts_ms: default_wait_between_attempts_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files, stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation of log files: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
