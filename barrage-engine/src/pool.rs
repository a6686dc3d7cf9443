//! Bounded-concurrency execution pool

use crate::collector::{BatchResult, Sample};
use crate::context::{cache_token, RunContext};
use crate::error::{EngineError, EngineResult};
use crate::plan::Phase;
use crate::sample::{ResponseOutcome, SampleTiming};
use barrage_http::{HttpTransport, Milestones, RequestSpec};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A batch handed to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub count: usize,
    pub concurrency: usize,
    pub phase: Option<Phase>,
}

impl Batch {
    pub fn new(count: usize, concurrency: usize, phase: Option<Phase>) -> Self {
        Self {
            count,
            concurrency,
            phase,
        }
    }

    /// A single request, as sent by chain steps
    pub fn single() -> Self {
        Self::new(1, 1, None)
    }
}

/// Which response bodies the pool keeps in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyRetention {
    /// Only the body of dispatch index 0
    #[default]
    FirstOnly,
    All,
}

impl BodyRetention {
    fn keeps(&self, index: usize) -> bool {
        match self {
            BodyRetention::FirstOnly => index == 0,
            BodyRetention::All => true,
        }
    }
}

/// Lazy, finite sequence of the requests of one batch.
///
/// Rebuilding it from the same base request and index range yields the same
/// requests again, apart from fresh cache tokens.
#[derive(Debug, Clone)]
pub struct RequestSequence<'a> {
    base: &'a RequestSpec,
    indices: Range<usize>,
}

impl<'a> RequestSequence<'a> {
    pub fn new(base: &'a RequestSpec, indices: Range<usize>) -> Self {
        Self { base, indices }
    }
}

impl Iterator for RequestSequence<'_> {
    type Item = (usize, RequestSpec);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        let request = if self.base.bypass_cache {
            self.base.with_cache_token(&cache_token(index))
        } else {
            self.base.clone()
        };
        Some((index, request))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl ExactSizeIterator for RequestSequence<'_> {}

/// Sends batches of requests over a shared transport
#[derive(Clone)]
pub struct ExecutionPool {
    transport: Arc<dyn HttpTransport>,
    retention: BodyRetention,
}

impl ExecutionPool {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            retention: BodyRetention::default(),
        }
    }

    pub fn with_retention(mut self, retention: BodyRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Send `batch.count` requests derived from `base`, at most
    /// `batch.concurrency` at a time. Returns once every request has
    /// completed or failed. Transport failures become outcomes with status 0.
    pub async fn run_batch(
        &self,
        ctx: &mut RunContext,
        base: &RequestSpec,
        batch: &Batch,
    ) -> EngineResult<BatchResult> {
        let indices = ctx.reserve(batch.count);
        let concurrency = batch.concurrency.max(1);
        debug!(
            "Dispatching batch of {} requests (indices {:?}, concurrency {}, phase {:?})",
            batch.count, indices, concurrency, batch.phase
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles: Vec<(usize, JoinHandle<Sample>)> = Vec::with_capacity(batch.count);

        for (index, request) in RequestSequence::new(base, indices) {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Internal(format!("pool semaphore closed: {}", e)))?;

            let transport = Arc::clone(&self.transport);
            let keep_body = self.retention.keeps(index);
            let run_started = ctx.started();
            let phase = batch.phase;

            let handle = tokio::spawn(async move {
                let sample = send_one(
                    transport.as_ref(),
                    index,
                    &request,
                    keep_body,
                    run_started,
                    phase,
                )
                .await;
                drop(permit);
                sample
            });
            handles.push((index, handle));
        }

        let mut result = BatchResult {
            samples: Vec::with_capacity(handles.len()),
        };
        for (index, handle) in handles {
            match handle.await {
                Ok(sample) => result.samples.push(sample),
                Err(e) => {
                    warn!("Request task {} did not complete: {}", index, e);
                    let elapsed = ctx.elapsed().as_secs_f64();
                    result.samples.push(Sample {
                        timing: SampleTiming::from_milestones(
                            index,
                            Milestones::default(),
                            elapsed,
                            batch.phase,
                        ),
                        outcome: ResponseOutcome::failed(
                            index,
                            format!("request task failed: {}", e),
                        ),
                    });
                }
            }
        }

        Ok(result)
    }
}

async fn send_one(
    transport: &dyn HttpTransport,
    index: usize,
    request: &RequestSpec,
    keep_body: bool,
    run_started: Instant,
    phase: Option<Phase>,
) -> Sample {
    match transport.send(request).await {
        Ok(response) => {
            let elapsed = run_started.elapsed().as_secs_f64();
            Sample {
                timing: SampleTiming::from_milestones(index, response.timing, elapsed, phase),
                outcome: ResponseOutcome {
                    index,
                    status: response.status,
                    headers: response.headers,
                    body_size: response.body.len(),
                    body: keep_body.then_some(response.body),
                    error: None,
                },
            }
        }
        Err(failure) => {
            let elapsed = run_started.elapsed().as_secs_f64();
            Sample {
                timing: SampleTiming::from_milestones(index, failure.timing, elapsed, phase),
                outcome: ResponseOutcome::failed(index, failure.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use barrage_http::{FailureKind, ResponseHeaders, TransportFailure, TransportResponse};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Transport that tracks how many requests are in flight at once
    struct GaugeTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        sent: AtomicUsize,
    }

    impl GaugeTransport {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                sent: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for GaugeTransport {
        async fn send(
            &self,
            request: &RequestSpec,
        ) -> Result<TransportResponse, TransportFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.sent.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.url.path() == "/down" {
                return Err(TransportFailure {
                    kind: FailureKind::Connect,
                    message: "connection refused".to_string(),
                    timing: Milestones::default(),
                });
            }

            Ok(TransportResponse {
                status: 200,
                headers: ResponseHeaders::new(),
                body: Bytes::from_static(b"ok"),
                timing: Milestones {
                    first_byte: 0.005,
                    total: 0.01,
                    ..Milestones::default()
                },
            })
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let transport = Arc::new(GaugeTransport::new());
        let pool = ExecutionPool::new(transport.clone());
        let base = RequestSpec::new("http://example.test/").unwrap();
        let mut ctx = RunContext::new();

        let result = pool
            .run_batch(&mut ctx, &base, &Batch::new(20, 3, Some(Phase::Sustain)))
            .await
            .unwrap();

        assert_eq!(result.len(), 20);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 20);
        assert!(transport.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_indices_continue_across_batches() {
        let pool = ExecutionPool::new(Arc::new(GaugeTransport::new()));
        let base = RequestSpec::new("http://example.test/").unwrap();
        let mut ctx = RunContext::new();

        let first = pool.run_batch(&mut ctx, &base, &Batch::new(3, 2, None)).await.unwrap();
        let second = pool.run_batch(&mut ctx, &base, &Batch::new(2, 2, None)).await.unwrap();

        let mut indices: Vec<_> = first
            .samples
            .iter()
            .chain(second.samples.iter())
            .map(|s| s.timing.index)
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_only_first_body_retained_by_default() {
        let pool = ExecutionPool::new(Arc::new(GaugeTransport::new()));
        let base = RequestSpec::new("http://example.test/").unwrap();
        let mut ctx = RunContext::new();

        let result = pool.run_batch(&mut ctx, &base, &Batch::new(3, 3, None)).await.unwrap();
        for sample in &result.samples {
            assert_eq!(sample.outcome.body_size, 2);
            assert_eq!(sample.outcome.body.is_some(), sample.outcome.index == 0);
        }
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_status_zero_outcome() {
        let pool = ExecutionPool::new(Arc::new(GaugeTransport::new()));
        let base = RequestSpec::new("http://example.test/down").unwrap();
        let mut ctx = RunContext::new();

        let result = pool.run_batch(&mut ctx, &base, &Batch::single()).await.unwrap();
        let outcome = &result.samples[0].outcome;
        assert_eq!(outcome.status, 0);
        assert!(outcome.error.as_deref().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_request_sequence_adds_cache_tokens() {
        let base = RequestSpec::new("http://example.test/a")
            .unwrap()
            .with_bypass_cache(true);
        let requests: Vec<_> = RequestSequence::new(&base, 4..6).collect();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, 4);
        assert!(requests[0].1.url.query().unwrap().starts_with("_cb="));
        assert_ne!(requests[0].1.url, requests[1].1.url);
    }

    #[test]
    fn test_request_sequence_without_bypass_reuses_url() {
        let base = RequestSpec::new("http://example.test/a").unwrap();
        let mut sequence = RequestSequence::new(&base, 0..3);
        assert_eq!(sequence.len(), 3);
        assert!(sequence.all(|(_, request)| request.url == base.url));
    }
}
