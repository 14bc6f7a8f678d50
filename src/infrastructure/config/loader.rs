use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".dynamic-scheduler";

/// Prefix of environment overrides, nested sections split on `__`.
pub const ENV_PREFIX: &str = "DYNAMIC_SCHEDULER_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database url cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Redis url cannot be empty")]
    EmptyRedisUrl,

    #[error("status_monitor.max_parallel_updates must be set")]
    MissingMaxParallelUpdates,

    #[error("Invalid max_parallel_updates: {0}. Must be at least 1")]
    InvalidMaxParallelUpdates(usize),

    #[error("Invalid refresh_interval_ms: {0}. Must be positive")]
    InvalidRefreshInterval(u64),

    #[error("Invalid status_ttl_ms: {0}. Must be positive")]
    InvalidStatusTtl(u64),

    #[error(
        "Invalid lease_ttl_ms: {lease_ttl_ms} must be longer than refresh_interval_ms ({refresh_interval_ms})"
    )]
    LeaseShorterThanInterval {
        lease_ttl_ms: u64,
        refresh_interval_ms: u64,
    },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .dynamic-scheduler/config.yaml
    /// 3. .dynamic-scheduler/local.yaml (optional local overrides)
    /// 4. Environment variables (DYNAMIC_SCHEDULER_* prefix)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same as [`ConfigLoader::load`] with a custom configuration directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.url.is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        if config.redis.url.is_empty() {
            return Err(ConfigError::EmptyRedisUrl);
        }

        let monitor = &config.status_monitor;
        match monitor.max_parallel_updates {
            None => return Err(ConfigError::MissingMaxParallelUpdates),
            Some(0) => return Err(ConfigError::InvalidMaxParallelUpdates(0)),
            Some(_) => {}
        }

        if monitor.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidRefreshInterval(0));
        }

        if monitor.status_ttl_ms == 0 {
            return Err(ConfigError::InvalidStatusTtl(0));
        }

        // A lease that lapses between ticks lets two replicas sweep at once.
        if monitor.lease_ttl_ms <= monitor.refresh_interval_ms {
            return Err(ConfigError::LeaseShorterThanInterval {
                lease_ttl_ms: monitor.lease_ttl_ms,
                refresh_interval_ms: monitor.refresh_interval_ms,
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
