use async_trait::async_trait;
use barrage_engine::scheduler::{ramp_down_vus, ramp_up_vus};
use barrage_engine::stats::{self, percentile};
use barrage_engine::timeseries::bucketize;
use barrage_engine::{
    Batch, CollectedSamples, ExecutionPool, LoadPlan, PhaseDurations, PhaseScheduler,
    ResponseOutcome, RunContext, SampleTiming,
};
use barrage_http::{
    HttpTransport, Milestones, RequestSpec, ResponseHeaders, TransportFailure, TransportResponse,
};
use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct InstantTransport;

#[async_trait]
impl HttpTransport for InstantTransport {
    async fn send(&self, _request: &RequestSpec) -> Result<TransportResponse, TransportFailure> {
        tokio::task::yield_now().await;
        Ok(TransportResponse {
            status: 200,
            headers: ResponseHeaders::new(),
            body: bytes::Bytes::new(),
            timing: Milestones::default(),
        })
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn samples(points: &[(f64, f64, f64, f64, f64, f64)]) -> CollectedSamples {
    let mut samples = CollectedSamples::default();
    for (index, &(dns, connect, tls, first_byte, total, elapsed)) in points.iter().enumerate() {
        samples.timings.push(SampleTiming {
            index,
            dns,
            connect,
            tls,
            first_byte,
            total,
            elapsed,
            phase: None,
        });
        let mut outcome = ResponseOutcome::failed(index, "unused");
        outcome.status = 200;
        outcome.error = None;
        samples.outcomes.push(outcome);
    }
    samples
}

proptest! {
    #[test]
    fn percentiles_are_monotonic(mut values in prop::collection::vec(0.0f64..10_000.0, 1..200)) {
        values.sort_by(f64::total_cmp);
        let ps = [0.5, 0.75, 0.9, 0.95, 0.99, 1.0];
        let computed: Vec<f64> = ps.iter().map(|&p| percentile(&values, p)).collect();

        for pair in computed.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        prop_assert_eq!(computed[5], values[values.len() - 1]);
        prop_assert!(computed[0] >= values[0]);
    }

    #[test]
    fn bottleneck_legs_are_never_negative(
        points in prop::collection::vec(
            (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..5.0),
            1..50,
        )
    ) {
        let samples = samples(&points);
        let breakdown = stats::bottleneck(&samples.timings);
        let value = serde_json::to_value(&breakdown).unwrap();

        for (_, leg) in value.as_object().unwrap() {
            prop_assert!(leg.as_f64().unwrap() >= 0.0);
        }
        for timing in &samples.timings {
            let legs = timing.legs();
            for leg in [legs.dns, legs.tcp, legs.tls, legs.server, legs.download] {
                prop_assert!(leg >= 0.0);
            }
        }
    }

    #[test]
    fn ramps_stay_between_warmup_and_max(
        max_vus in 1u32..=100,
        percent in 5u32..=100,
        duration in 1u32..60,
    ) {
        let plan = LoadPlan::new(max_vus, 1).with_phases(
            PhaseDurations { ramp_up: duration, ..PhaseDurations::default() },
            percent,
        );
        let warmup = plan.warmup_vus();

        let mut previous_up = warmup;
        let mut previous_down = max_vus;
        for s in 1..=duration {
            let up = ramp_up_vus(warmup, max_vus, s, duration);
            let down = ramp_down_vus(warmup, max_vus, s, duration);
            prop_assert!(up >= previous_up && up <= max_vus);
            prop_assert!(down <= previous_down && down >= warmup);
            previous_up = up;
            previous_down = down;
        }
        prop_assert_eq!(ramp_up_vus(warmup, max_vus, duration, duration), max_vus);
        prop_assert_eq!(ramp_down_vus(warmup, max_vus, duration, duration), warmup);
    }

    #[test]
    fn phased_plans_never_exceed_requested_total(
        max_vus in 1u32..=20,
        iterations in 1u32..=20,
        warmup in 0u32..4,
        ramp_up in 0u32..4,
        sustain in 0u32..4,
        ramp_down in 0u32..4,
    ) {
        let plan = LoadPlan::new(max_vus, iterations).with_phases(
            PhaseDurations { warmup, ramp_up, sustain, ramp_down },
            20,
        );
        let phases = PhaseScheduler::new(Duration::ZERO).plan(&plan);

        prop_assert!(phases.planned_requests() <= plan.total_iterations());
        prop_assert!(phases.batches.iter().all(|b| b.requests > 0 && b.vus <= max_vus));
        if !plan.is_phased() {
            prop_assert_eq!(phases.planned_requests(), plan.total_iterations());
        }
    }

    #[test]
    fn buckets_cover_every_second(elapsed in prop::collection::vec(0.0f64..30.0, 0..80)) {
        let points: Vec<_> = elapsed.iter().map(|&e| (0.0, 0.0, 0.0, 0.0, 0.01, e)).collect();
        let samples = samples(&points);
        let buckets = bucketize(&samples, Utc::now(), 10);

        let expected = elapsed.iter().fold(0.0f64, |a, &b| a.max(b)).ceil().max(1.0) as usize;
        prop_assert_eq!(buckets.len(), expected);
        for (position, bucket) in buckets.iter().enumerate() {
            prop_assert_eq!(bucket.bucket, position);
        }
        let counted: usize = buckets.iter().map(|b| b.success_count + b.error_count).sum();
        prop_assert_eq!(counted, elapsed.len());
    }

    #[test]
    fn dispatch_indices_are_contiguous(
        batches in prop::collection::vec((1usize..20, 1usize..8), 1..5)
    ) {
        let rt = runtime();
        let indices = rt.block_on(async {
            let pool = ExecutionPool::new(Arc::new(InstantTransport));
            let base = RequestSpec::new("http://example.test/").unwrap();
            let mut ctx = RunContext::new();
            let mut indices = Vec::new();
            for &(count, concurrency) in &batches {
                let result = pool
                    .run_batch(&mut ctx, &base, &Batch::new(count, concurrency, None))
                    .await
                    .unwrap();
                indices.extend(result.samples.iter().map(|s| s.timing.index));
            }
            indices
        });

        let total: usize = batches.iter().map(|(count, _)| count).sum();
        prop_assert_eq!(indices, (0..total).collect::<Vec<_>>());
    }
}
