//! Per-request network milestone capture
//!
//! A [`TimingProbe`] is installed as a task-local for the duration of one
//! request. The client's DNS resolver ([`ProbingResolver`]) and connector
//! layer ([`ConnectProbeLayer`]) look the probe up when they start work on
//! behalf of that request and stamp the elapsed time when they finish.
//! Requests served from a pooled connection never reach either hook, so their
//! DNS/connect/TLS milestones stay at zero.
//!
//! The connector reports a single "connection established" instant. For
//! plain HTTP that is the TCP connect milestone; for HTTPS it is the end of
//! the TLS handshake, and the TCP milestone is reported equal to the DNS
//! milestone because the two cannot be told apart from outside the connector.

use futures::future::{BoxFuture, FutureExt};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

tokio::task_local! {
    static ACTIVE_PROBE: TimingProbe;
}

/// Elapsed seconds from a request's own start to each network milestone.
/// Unreached milestones are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestones {
    pub dns: f64,
    pub connect: f64,
    pub tls: f64,
    pub first_byte: f64,
    pub total: f64,
}

#[derive(Debug, Default)]
struct Marks {
    dns: AtomicU64,
    connected: AtomicU64,
    first_byte: AtomicU64,
    complete: AtomicU64,
}

/// Records milestone instants for one request. Cheap to clone; clones share
/// the same marks. Each milestone keeps its first recorded value.
#[derive(Debug, Clone)]
pub struct TimingProbe {
    started: Instant,
    marks: Arc<Marks>,
}

impl TimingProbe {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            marks: Arc::new(Marks::default()),
        }
    }

    /// Run `fut` with this probe visible to the resolver and connector hooks
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        ACTIVE_PROBE.scope(self.clone(), fut).await
    }

    /// The probe of the request currently being polled, if any
    pub fn current() -> Option<TimingProbe> {
        ACTIVE_PROBE.try_with(Clone::clone).ok()
    }

    pub fn mark_dns(&self) {
        self.stamp(&self.marks.dns);
    }

    pub fn mark_connected(&self) {
        self.stamp(&self.marks.connected);
    }

    pub fn mark_first_byte(&self) {
        self.stamp(&self.marks.first_byte);
    }

    pub fn mark_complete(&self) {
        self.stamp(&self.marks.complete);
    }

    fn stamp(&self, slot: &AtomicU64) {
        // Zero is the "unset" marker, so never store a zero elapsed time
        let nanos = (self.started.elapsed().as_nanos() as u64).max(1);
        let _ = slot.compare_exchange(0, nanos, Ordering::AcqRel, Ordering::Acquire);
    }

    fn read(slot: &AtomicU64) -> f64 {
        slot.load(Ordering::Acquire) as f64 / 1_000_000_000.0
    }

    /// Freeze the recorded marks into milestones.
    ///
    /// `total` falls back to the elapsed time at the moment of the call, which
    /// is what a failed request reports. Connection marks that land after the
    /// first byte came from a connect raced in the background by the pool and
    /// are dropped.
    pub fn snapshot(&self, is_tls: bool) -> Milestones {
        let elapsed = self.started.elapsed().as_secs_f64();
        let first_byte = Self::read(&self.marks.first_byte);
        let complete = Self::read(&self.marks.complete);
        let total = if complete > 0.0 { complete } else { elapsed };

        let ceiling = if first_byte > 0.0 { first_byte } else { total };
        let within = |value: f64| if value <= ceiling { value } else { 0.0 };

        let dns = within(Self::read(&self.marks.dns));
        let connected = within(Self::read(&self.marks.connected)).max(dns);
        let connected = if connected > 0.0 { connected } else { 0.0 };

        let (connect, tls) = if is_tls {
            (dns, connected)
        } else {
            (connected, connected)
        };

        Milestones {
            dns,
            connect,
            tls,
            first_byte,
            total,
        }
    }
}

/// DNS resolver that stamps the active probe once the lookup finishes
#[derive(Debug, Clone, Default)]
pub struct ProbingResolver;

impl Resolve for ProbingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let probe = TimingProbe::current();
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((name.as_str(), 0)).await?;
            let addrs: Vec<_> = addrs.collect();
            if let Some(probe) = probe {
                probe.mark_dns();
            }
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}

/// Connector layer that stamps the active probe once a new connection
/// (including any TLS handshake) is ready
#[derive(Debug, Clone, Default)]
pub struct ConnectProbeLayer;

impl<S> Layer<S> for ConnectProbeLayer {
    type Service = ConnectProbe<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConnectProbe { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectProbe<S> {
    inner: S,
}

impl<S, R> Service<R> for ConnectProbe<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let probe = TimingProbe::current();
        let connecting = self.inner.call(request);
        async move {
            let connection = connecting.await;
            if connection.is_ok() {
                if let Some(probe) = probe {
                    probe.mark_connected();
                }
            }
            connection
        }
        .boxed()
    }
}
