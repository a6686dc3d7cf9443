//! Domain-specific configuration modules

pub mod engine;
pub mod http;
pub mod logging;
pub mod output;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Barrage configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BarrageConfig {
    /// Load engine limits and pacing
    #[serde(default)]
    pub engine: engine::EngineConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Result output configuration
    #[serde(default)]
    pub output: output::OutputConfig,
}

impl BarrageConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        self.output.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = BarrageConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
