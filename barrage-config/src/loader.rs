//! Configuration loading and environment variable handling

use crate::domains::BarrageConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "BARRAGE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML (or `.json`) file with environment
    /// overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<BarrageConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut config: BarrageConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<BarrageConfig> {
        let mut config = BarrageConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<BarrageConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut BarrageConfig) -> ConfigResult<()> {
        self.apply_engine_overrides(&mut config.engine)?;
        self.apply_http_overrides(&mut config.http)?;
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_output_overrides(&mut config.output);
        Ok(())
    }

    /// Apply engine config overrides
    fn apply_engine_overrides(
        &self,
        config: &mut crate::domains::engine::EngineConfig,
    ) -> ConfigResult<()> {
        if let Some(value) = self.parse_env_var("MAX_CONCURRENCY")? {
            config.max_concurrency = value;
        }

        if let Some(value) = self.parse_env_var("MAX_ITERATIONS")? {
            config.max_iterations = value;
        }

        if let Some(millis) = self.parse_env_var::<u64>("PACING_MS")? {
            config.pacing_delay = Duration::from_millis(millis);
        }

        if let Some(policy) = self.parse_env_var("LIMIT_POLICY")? {
            config.limit_policy = policy;
        }

        Ok(())
    }

    /// Apply HTTP config overrides
    fn apply_http_overrides(
        &self,
        config: &mut crate::domains::http::HttpConfig,
    ) -> ConfigResult<()> {
        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Some(verify_ssl) = self.parse_env_var("HTTP_VERIFY_SSL")? {
            config.verify_ssl = verify_ssl;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(level) = self.parse_env_var("LOG_LEVEL")? {
            config.level = level;
        }

        if let Some(format) = self.parse_env_var("LOG_FORMAT")? {
            config.format = format;
        }

        Ok(())
    }

    /// Apply output config overrides
    fn apply_output_overrides(&self, config: &mut crate::domains::output::OutputConfig) {
        if let Ok(path) = self.get_env_var("RESULTS_PATH") {
            config.results_path = Some(PathBuf::from(path));
        }
    }

    /// Parse an optional prefixed environment variable
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))
            }),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
