#![allow(clippy::result_large_err)]

use super::{ConfigValidator, StrategyConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "regstrategy.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/regstrategy.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<StrategyConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();

        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<StrategyConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("RS-CFG-001")
        })?;

        let config: StrategyConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("RS-CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(config: &mut StrategyConfig) {
        if let Ok(binary) = env::var("REGSTRATEGY_ENGINE_BINARY") {
            if !binary.trim().is_empty() {
                config.engine.binary = binary;
            }
        }

        if let Ok(timeout_str) = env::var("REGSTRATEGY_ENGINE_TIMEOUT") {
            if let Ok(timeout) = timeout_str.trim().parse::<u64>() {
                config.engine.timeout_seconds = timeout;
            }
        }

        if let Ok(pattern) = env::var("REGSTRATEGY_RESULT_PATTERN") {
            config.engine.result_pattern = pattern;
        }

        if let Ok(continue_str) = env::var("REGSTRATEGY_CONTINUE_INDEPENDENT") {
            if let Ok(continue_independent) = continue_str.trim().parse::<bool>() {
                config.run.continue_independent = continue_independent;
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "REGSTRATEGY_ENGINE_BINARY - Override the registration engine executable (default: elastix)",
            "REGSTRATEGY_ENGINE_TIMEOUT - Override the engine timeout in seconds (0 disables)",
            "REGSTRATEGY_RESULT_PATTERN - Override the engine result file pattern (default: result.0.{format})",
            "REGSTRATEGY_CONTINUE_INDEPENDENT - Keep running independent nodes after a failure (true/false)",
        ]
    }
}
