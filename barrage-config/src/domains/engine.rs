//! Load engine configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_range, Validatable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Hard ceiling on virtual users for a single run
pub const MAX_VUS: u32 = 100;
/// Hard ceiling on iterations per virtual user
pub const MAX_ITERATIONS: u32 = 1000;
/// Hard ceiling on `vus * iterations`
pub const MAX_TOTAL_REQUESTS: u64 = 100_000;

/// How out-of-range run parameters are handled at the run boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LimitPolicy {
    /// Clamp the value into its permitted range
    #[default]
    Clamp,
    /// Reject the run with a validation error
    Reject,
}

impl FromStr for LimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clamp" => Ok(LimitPolicy::Clamp),
            "reject" => Ok(LimitPolicy::Reject),
            _ => Err(format!("Invalid limit policy: {}", s)),
        }
    }
}

/// Load engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum concurrent virtual users
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Maximum iterations per virtual user
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum requests dispatched by one run
    #[serde(default = "default_max_total_requests")]
    pub max_total_requests: u64,

    /// Lower bound for the per-request timeout, in seconds
    #[serde(default = "default_min_timeout_secs")]
    pub min_timeout_secs: u64,

    /// Upper bound for the per-request timeout, in seconds
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// Timeout used when a run does not specify one, in seconds
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Delay between consecutive per-second batches of a phase
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_pacing_delay"
    )]
    pub pacing_delay: Duration,

    /// Clamp or reject out-of-range run parameters
    #[serde(default)]
    pub limit_policy: LimitPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_iterations: default_max_iterations(),
            max_total_requests: default_max_total_requests(),
            min_timeout_secs: default_min_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            default_timeout_secs: default_timeout_secs(),
            pacing_delay: default_pacing_delay(),
            limit_policy: LimitPolicy::default(),
        }
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_range(
            self.max_concurrency,
            1,
            MAX_VUS,
            "max_concurrency",
            self.domain_name(),
        )?;
        validate_range(
            self.max_iterations,
            1,
            MAX_ITERATIONS,
            "max_iterations",
            self.domain_name(),
        )?;
        validate_range(
            self.max_total_requests,
            1,
            MAX_TOTAL_REQUESTS,
            "max_total_requests",
            self.domain_name(),
        )?;
        validate_positive(self.min_timeout_secs, "min_timeout_secs", self.domain_name())?;

        if self.max_timeout_secs < self.min_timeout_secs {
            return Err(self.validation_error(format!(
                "max_timeout_secs ({}) must not be below min_timeout_secs ({})",
                self.max_timeout_secs, self.min_timeout_secs
            )));
        }

        validate_range(
            self.default_timeout_secs,
            self.min_timeout_secs,
            self.max_timeout_secs,
            "default_timeout_secs",
            self.domain_name(),
        )?;

        if self.pacing_delay > Duration::from_secs(10) {
            return Err(self.validation_error("pacing_delay must not exceed 10000ms"));
        }
        if self.pacing_delay.is_zero() {
            log::warn!("pacing_delay is 0, batches of a phase will be sent back to back");
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "engine"
    }
}

// Default value functions
fn default_max_concurrency() -> u32 {
    MAX_VUS
}

fn default_max_iterations() -> u32 {
    MAX_ITERATIONS
}

fn default_max_total_requests() -> u64 {
    MAX_TOTAL_REQUESTS
}

fn default_min_timeout_secs() -> u64 {
    1
}

fn default_max_timeout_secs() -> u64 {
    120
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pacing_delay() -> Duration {
    Duration::from_millis(100)
}
