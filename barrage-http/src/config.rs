//! HTTP transport configuration

use barrage_config::HttpConfig as ConfigHttpConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings used to build the shared client of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum number of redirects to follow
    pub max_redirects: u32,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify TLS certificates
    pub verify_ssl: bool,

    /// Maximum idle connections kept per host
    pub max_idle_per_host: usize,

    /// How long an idle connection stays in the pool
    pub idle_timeout: Duration,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        ConfigHttpConfig::default().into()
    }
}

impl From<ConfigHttpConfig> for TransportConfig {
    fn from(config: ConfigHttpConfig) -> Self {
        Self {
            max_redirects: config.max_redirects,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
            max_idle_per_host: config.connection_pool.max_idle_per_host,
            idle_timeout: config.connection_pool.idle_timeout,
            connect_timeout: config.connect_timeout,
        }
    }
}
