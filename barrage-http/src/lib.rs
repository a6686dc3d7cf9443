//! HTTP transport for Barrage
//!
//! Sends one fully-resolved [`RequestSpec`] at a time over a shared reqwest
//! client and reports the elapsed time to each network milestone (name
//! resolution, connect, TLS, first byte, full body) alongside the response.

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod probe;
pub mod types;

// Re-export main types for convenience
pub use auth::AuthSpec;
pub use client::{
    FailureKind, HttpTransport, ReqwestTransport, TransportFailure, TransportResponse,
};
pub use config::TransportConfig;
pub use errors::HttpError;
pub use probe::{Milestones, TimingProbe};
pub use types::{Headers, HttpMethod, HttpMethodError, RequestSpec, ResponseHeaders};
