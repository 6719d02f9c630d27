#![allow(clippy::result_large_err)]

use super::StrategyConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &StrategyConfig) -> Result<(), AppError> {
        if config.engine.binary.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "engine.binary cannot be empty",
            )
            .with_code("RS-CFG-003"));
        }

        if config.engine.parameter_file_name.trim().is_empty()
            || config.engine.parameter_file_name.contains(['/', '\\'])
        {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "engine.parameter_file_name must be a plain file name",
            )
            .with_code("RS-CFG-003"));
        }

        // The result must land directly inside the child's output folder.
        let sample = config.engine.result_file_name("mhd");
        if sample.trim().is_empty() || sample.contains(['/', '\\']) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "engine.result_pattern must name a file inside the output folder",
            )
            .with_code("RS-CFG-003"));
        }

        if sample == config.engine.parameter_file_name {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "engine.result_pattern collides with engine.parameter_file_name",
            )
            .with_code("RS-CFG-003"));
        }

        Ok(())
    }
}
