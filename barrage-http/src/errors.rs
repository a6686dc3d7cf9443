//! HTTP error types

use crate::types::HttpMethodError;

/// Error type for HTTP setup operations. Failures of an individual request
/// are reported as [`crate::TransportFailure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error(transparent)]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
