//! Client settings for the load transport

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_range, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for `max_redirects`
pub const MAX_REDIRECTS: u32 = 20;

/// How each run's HTTP client is built
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Sent on every request unless the run sets its own `User-Agent`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Redirects followed per request; 0 reports the 3xx response as is
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Verify TLS certificates of the target. Off by default since targets
    /// are often staging hosts with self-signed certificates.
    #[serde(default = "crate::domains::utils::default_false")]
    pub verify_ssl: bool,

    /// Time allowed to establish a connection, seconds
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

/// Reuse of connections between requests of the same run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    /// Idle connections kept per host. 0 opens a fresh connection for every
    /// request, so each sample includes DNS, connect and TLS time.
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// Seconds an idle connection stays reusable
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_idle_timeout"
    )]
    pub idle_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            verify_ssl: false,
            connect_timeout: default_connect_timeout(),
            connection_pool: ConnectionPoolConfig::default(),
        }
    }
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_max_idle_per_host(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;
        validate_range(
            self.max_redirects,
            0,
            MAX_REDIRECTS,
            "max_redirects",
            self.domain_name(),
        )?;
        validate_positive(
            self.connect_timeout.as_secs(),
            "connect_timeout",
            self.domain_name(),
        )?;
        self.connection_pool.validate()
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

impl Validatable for ConnectionPoolConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_idle_per_host > 0 {
            validate_positive(
                self.idle_timeout.as_secs(),
                "idle_timeout",
                self.domain_name(),
            )?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http.connection_pool"
    }
}

fn default_user_agent() -> String {
    concat!("Barrage/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_redirects() -> u32 {
    10
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_idle_per_host() -> usize {
    100
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(90)
}
