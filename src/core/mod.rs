pub mod config;
pub mod error;
pub mod strategy;
pub mod types;

pub use config::{ConfigLoader, ConfigValidator, EngineConfig, RunConfig, StrategyConfig};
pub use error::AppError;
pub use types::*;
