use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("modules_dir cannot be empty")]
    EmptyModulesDir,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid poll_interval_secs: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. oak.yaml in the working directory
    /// 3. oak.local.yaml (local overrides, optional)
    /// 4. Environment variables (OAK_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("oak.yaml"))
            .merge(Yaml::file("oak.local.yaml"))
            .merge(Self::env())
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Self::env())
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    // Module overrides use OAK_MODULE_<NAME>__ and are resolved per module.
    fn env() -> Env {
        Env::prefixed("OAK_")
            .filter(|key| !key.starts_with("module_"))
            .split("__")
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.modules_dir.trim().is_empty() {
            return Err(ConfigError::EmptyModulesDir);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPollInterval(config.scheduler.poll_interval_secs));
        }

        if config.allocation.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.allocation.max_attempts));
        }

        if config.allocation.initial_backoff_ms >= config.allocation.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.allocation.initial_backoff_ms,
                config.allocation.max_backoff_ms,
            ));
        }

        for name in &config.critical_modules {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "critical_modules entries cannot be empty".to_string(),
                ));
            }
        }

        if let Some(url) = &config.delivery.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationFailed(format!(
                    "delivery.webhook_url must be an http(s) URL, got '{url}'"
                )));
            }
        }

        Ok(())
    }
}
