use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "info";

/// Resolved logging configuration after reading config files and env overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: true,
            console_output: None,
        }
    }
}

impl LoggingConfig {
    /// Defaults, then `<workspace>/.regstrategy/config/logging.toml`, then env overrides.
    pub fn load(workspace_root: Option<&Path>) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(workspace) = workspace_root {
            let path = workspace
                .join(".regstrategy")
                .join("config")
                .join("logging.toml");
            if let Some(section) = Self::load_from_file(&path)? {
                config.apply(section);
            }
        }
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Option<TomlLoggingSection>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read logging config {}", path.display()))?;
        let parsed: TomlLogging = toml::from_str(&content)
            .with_context(|| format!("failed to parse logging config {}", path.display()))?;
        Ok(parsed.logging)
    }

    fn apply(&mut self, section: TomlLoggingSection) {
        if let Some(log_dir) = section.log_dir {
            self.log_dir = Some(log_dir);
        }
        if let Some(default_level) = section.default_level {
            self.default_level = default_level;
        }
        if let Some(enable_file) = section.enable_file {
            self.enable_file = enable_file;
        }
        if section.console_output.is_some() {
            self.console_output = section.console_output;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = env::var("REGSTRATEGY_LOG_CONSOLE") {
            if !value.trim().is_empty() {
                let output = ConsoleOutput::from_str(&value).map_err(|err| anyhow!(err))?;
                self.console_output = Some(output);
            }
        }
        if let Ok(value) = env::var("REGSTRATEGY_LOG_FILE") {
            if let Ok(enabled) = value.trim().parse::<bool>() {
                self.enable_file = enabled;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.default_level must be a valid tracing directive"))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TomlLogging {
    logging: Option<TomlLoggingSection>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingSection {
    log_dir: Option<PathBuf>,
    default_level: Option<String>,
    enable_file: Option<bool>,
    #[serde(default)]
    console_output: Option<ConsoleOutput>,
}
