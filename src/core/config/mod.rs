use serde::{Deserialize, Serialize};

/// Main configuration loaded from regstrategy.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StrategyConfig {
    /// External registration engine invocation
    #[serde(default)]
    pub engine: EngineConfig,

    /// Graph run policy
    #[serde(default)]
    pub run: RunConfig,
}

/// How the external registration engine is invoked and where its output lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Engine executable, resolved through PATH when not absolute
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Arguments placed before the image and parameter arguments
    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default = "default_fixed_flag")]
    pub fixed_flag: String,

    #[serde(default = "default_moving_flag")]
    pub moving_flag: String,

    #[serde(default = "default_parameter_flag")]
    pub parameter_flag: String,

    #[serde(default = "default_output_flag")]
    pub output_flag: String,

    /// Name of the serialized transformation inside the output folder
    #[serde(default = "default_parameter_file_name")]
    pub parameter_file_name: String,

    /// Result file name inside the output folder; `{format}` is replaced by
    /// the transformation's ResultImageFormat
    #[serde(default = "default_result_pattern")]
    pub result_pattern: String,

    /// Format used when the transformation does not set ResultImageFormat
    #[serde(default = "default_result_format")]
    pub default_result_format: String,

    /// Kill the engine after this many seconds; 0 disables the limit
    #[serde(default)]
    pub timeout_seconds: u64,
}

/// Policy applied by `StrategyGraph::run`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunConfig {
    /// Keep executing nodes that do not depend on a failed node
    #[serde(default)]
    pub continue_independent: bool,
}

fn default_binary() -> String {
    "elastix".to_string()
}

fn default_fixed_flag() -> String {
    "-f".to_string()
}

fn default_moving_flag() -> String {
    "-m".to_string()
}

fn default_parameter_flag() -> String {
    "-p".to_string()
}

fn default_output_flag() -> String {
    "-out".to_string()
}

fn default_parameter_file_name() -> String {
    "parameters.txt".to_string()
}

fn default_result_pattern() -> String {
    "result.0.{format}".to_string()
}

fn default_result_format() -> String {
    "mhd".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            binary: default_binary(),
            extra_args: Vec::new(),
            fixed_flag: default_fixed_flag(),
            moving_flag: default_moving_flag(),
            parameter_flag: default_parameter_flag(),
            output_flag: default_output_flag(),
            parameter_file_name: default_parameter_file_name(),
            result_pattern: default_result_pattern(),
            default_result_format: default_result_format(),
            timeout_seconds: 0,
        }
    }
}

impl EngineConfig {
    /// Result file name for the given image format.
    pub fn result_file_name(&self, format: &str) -> String {
        self.result_pattern.replace("{format}", format)
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
