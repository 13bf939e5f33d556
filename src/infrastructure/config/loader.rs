use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

const PLACEHOLDER_KEYS: [&str; 3] = ["your-key-here", "your-api-key", "changeme"];

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("No branches configured. Add at least one entry under `branches`")]
    NoBranches,

    #[error("Empty model id in {0}")]
    EmptyModelId(String),

    #[error("Invalid temperature for {field}: {value}. Must be between 0.0 and 2.0")]
    InvalidTemperature { field: String, value: f32 },

    #[error("Invalid screenshot_quality: {0}. Must be between 1 and 100")]
    InvalidScreenshotQuality(u8),

    #[error("Invalid viewport {width}x{height}. Both dimensions must be positive")]
    InvalidViewport { width: u32, height: u32 },

    #[error("Invalid sandbox timeout_ms: 0")]
    InvalidSandboxTimeout,

    #[error("Invalid max_attempts: 0. At least one call is required")]
    InvalidMaxAttempts,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid requests_per_second: 0")]
    InvalidRateLimit,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("provider.api_key is still a placeholder value")]
    PlaceholderApiKey,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .tribunal/config.yaml (project config)
    /// 3. .tribunal/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TRIBUNAL_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        let figment = Self::defaults()
            .merge(Yaml::file(".tribunal/config.yaml"))
            .merge(Yaml::file(".tribunal/local.yaml"));
        Self::finish(figment, "project configuration")
    }

    /// Load configuration from a specific file; environment variables still override it
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let figment = Self::defaults().merge(Yaml::file(path));
        Self::finish(figment, &path.display().to_string())
    }

    /// Load from `path` when given, otherwise from the project files
    pub fn load_with(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    fn defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(Config::default()))
    }

    fn finish(figment: Figment, source: &str) -> Result<Config> {
        let config: Config = figment
            .merge(Env::prefixed("TRIBUNAL_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {source}"))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.branches.is_empty() {
            return Err(ConfigError::NoBranches);
        }

        for (index, branch) in config.branches.iter().enumerate() {
            if branch.model.id.trim().is_empty() {
                return Err(ConfigError::EmptyModelId(format!("branches[{index}]")));
            }
            check_temperature(&format!("branches[{index}]"), branch.temperature)?;
        }

        if let Some(verifier) = &config.verifier_model {
            if verifier.id.trim().is_empty() {
                return Err(ConfigError::EmptyModelId("verifier_model".to_string()));
            }
        }
        if config.judge_model.id.trim().is_empty() {
            return Err(ConfigError::EmptyModelId("judge_model".to_string()));
        }
        if let Some(fallback) = &config.synthesizer_fallback_model {
            if fallback.id.trim().is_empty() {
                return Err(ConfigError::EmptyModelId(
                    "synthesizer_fallback_model".to_string(),
                ));
            }
        }
        check_temperature("verifier_temperature", config.verifier_temperature)?;
        check_temperature("judge_temperature", config.judge_temperature)?;
        check_temperature("synthesizer_temperature", config.synthesizer_temperature)?;

        // Validate sandbox config
        let sandbox = &config.sandbox;
        if !(1..=100).contains(&sandbox.screenshot_quality) {
            return Err(ConfigError::InvalidScreenshotQuality(
                sandbox.screenshot_quality,
            ));
        }
        if sandbox.viewport.width == 0 || sandbox.viewport.height == 0 {
            return Err(ConfigError::InvalidViewport {
                width: sandbox.viewport.width,
                height: sandbox.viewport.height,
            });
        }
        if sandbox.timeout_ms == 0 {
            return Err(ConfigError::InvalidSandboxTimeout);
        }

        // Validate retry config
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts);
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.provider.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit);
        }
        if let Some(key) = &config.provider.api_key {
            if PLACEHOLDER_KEYS.contains(&key.trim()) {
                return Err(ConfigError::PlaceholderApiKey);
            }
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
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

fn check_temperature(field: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=2.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTemperature {
            field: field.to_string(),
            value,
        })
    }
}
