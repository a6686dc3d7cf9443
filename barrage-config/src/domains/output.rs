//! Result output configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how run results are emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Append one JSON line per finished run to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_path: Option<PathBuf>,

    /// Include the per-request timing breakdown in reports
    #[serde(default = "crate::domains::utils::default_true")]
    pub include_requests: bool,

    /// Pretty-print JSON reports written by the CLI
    #[serde(default = "crate::domains::utils::default_true")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: None,
            include_requests: true,
            pretty: true,
        }
    }
}

impl Validatable for OutputConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(ref path) = self.results_path {
            validate_required_string(
                &path.to_string_lossy(),
                "results_path",
                self.domain_name(),
            )?;
            if path.is_dir() {
                return Err(self.validation_error(format!(
                    "results_path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "output"
    }
}
