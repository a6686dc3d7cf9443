//! HTTP transport implementation

use crate::config::TransportConfig;
use crate::errors::HttpError;
use crate::probe::{ConnectProbeLayer, Milestones, ProbingResolver, TimingProbe};
use crate::types::{RequestSpec, ResponseHeaders};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// A response whose status line and full body were received
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Bytes,
    pub timing: Milestones,
}

/// Where a request broke down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Dns,
    Connect,
    Tls,
    Timeout,
    Request,
    Body,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Dns => "dns",
            FailureKind::Connect => "connect",
            FailureKind::Tls => "tls",
            FailureKind::Timeout => "timeout",
            FailureKind::Request => "request",
            FailureKind::Body => "body",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A request that produced no complete response
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Milestones reached before the failure; `total` is the time spent
    pub timing: Milestones,
}

/// Sends one request and reports its timing
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<TransportResponse, TransportFailure>;
}

/// Transport backed by a single pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build the shared client with timing hooks installed
    pub fn new(config: &TransportConfig) -> Result<Self, HttpError> {
        debug!(
            "Building HTTP transport (verify_ssl: {}, max_redirects: {})",
            config.verify_ssl, config.max_redirects
        );

        let redirects = if config.max_redirects == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(config.max_redirects as usize)
        };

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirects)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .dns_resolver(Arc::new(ProbingResolver))
            .connector_layer(ConnectProbeLayer)
            .build()?;

        Ok(Self { client })
    }

    fn build_headers(request: &RequestSpec) -> Result<HeaderMap, TransportFailure> {
        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportFailure {
                    kind: FailureKind::Request,
                    message: format!("Invalid header name '{}': {}", name, e),
                    timing: Milestones::default(),
                }
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| TransportFailure {
                kind: FailureKind::Request,
                message: format!("Invalid value for header '{}': {}", name, e),
                timing: Milestones::default(),
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    async fn exchange(
        &self,
        request: &RequestSpec,
        headers: HeaderMap,
        probe: &TimingProbe,
    ) -> Result<(u16, ResponseHeaders, Bytes), (FailureKind, String)> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.clone())
            .headers(headers)
            .timeout(request.timeout);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| (classify_error(&e), describe_error(&e)))?;
        probe.mark_first_byte();

        let status = response.status().as_u16();
        let headers = ResponseHeaders::from_header_map(response.headers());
        let body = response.bytes().await.map_err(|e| {
            let kind = if e.is_timeout() {
                FailureKind::Timeout
            } else {
                FailureKind::Body
            };
            (kind, describe_error(&e))
        })?;
        probe.mark_complete();

        Ok((status, headers, body))
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> Result<TransportResponse, TransportFailure> {
        let headers = Self::build_headers(request)?;
        let is_tls = request.url.scheme() == "https";

        trace!("{} {}", request.method, request.url);
        let probe = TimingProbe::start();
        let outcome = probe.scope(self.exchange(request, headers, &probe)).await;
        let timing = probe.snapshot(is_tls);

        match outcome {
            Ok((status, headers, body)) => Ok(TransportResponse {
                status,
                headers,
                body,
                timing,
            }),
            Err((kind, message)) => {
                debug!("{} {} failed ({}): {}", request.method, request.url, kind, message);
                Err(TransportFailure {
                    kind,
                    message,
                    timing,
                })
            }
        }
    }
}

/// Map a reqwest error onto the stage that failed
fn classify_error(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        return FailureKind::Timeout;
    }

    let message = describe_error(err).to_ascii_lowercase();
    if message.contains("dns")
        || message.contains("failed to lookup address")
        || message.contains("name or service not known")
    {
        return FailureKind::Dns;
    }
    if message.contains("tls") || message.contains("ssl") || message.contains("certificate") {
        return FailureKind::Tls;
    }
    if err.is_connect() {
        return FailureKind::Connect;
    }
    if err.is_body() || err.is_decode() {
        return FailureKind::Body;
    }
    if err.is_request() || err.is_builder() || err.is_redirect() {
        return FailureKind::Request;
    }

    FailureKind::Other
}

/// Error text including its source chain
fn describe_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
