//! One-second time series over a run

use crate::collector::CollectedSamples;
use crate::plan::Phase;
use crate::stats::percentile;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Metrics of one second of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesBucket {
    pub bucket: usize,
    pub timestamp: String,
    pub active_vus: u32,
    pub rps: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub success_count: usize,
    pub error_count: usize,
    pub phase: Phase,
}

/// Most frequent phase, ties going to the phase seen first
fn dominant_phase(phases: &[Phase]) -> Option<Phase> {
    let mut counts: Vec<(Phase, usize)> = Vec::new();
    for phase in phases {
        match counts.iter_mut().find(|(p, _)| p == phase) {
            Some((_, count)) => *count += 1,
            None => counts.push((*phase, 1)),
        }
    }

    let mut best: Option<(Phase, usize)> = None;
    for (phase, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((phase, count));
        }
    }
    best.map(|(phase, _)| phase)
}

/// Bucket samples by completion time since run start.
///
/// Every bucket index from 0 to the last occupied second is emitted; empty
/// seconds carry zero metrics and the `sustain` phase.
pub fn bucketize(
    samples: &CollectedSamples,
    started_at: DateTime<Utc>,
    max_vus: u32,
) -> Vec<TimeSeriesBucket> {
    let max_elapsed = samples
        .timings
        .iter()
        .map(|t| t.elapsed)
        .fold(0.0_f64, f64::max);
    let bucket_count = (max_elapsed.ceil() as usize).max(1);

    let mut totals: Vec<Vec<f64>> = vec![Vec::new(); bucket_count];
    let mut phases: Vec<Vec<Phase>> = vec![Vec::new(); bucket_count];
    let mut successes = vec![0usize; bucket_count];
    let mut errors = vec![0usize; bucket_count];

    for (timing, outcome) in samples.iter() {
        let index = (timing.elapsed.max(0.0).floor() as usize).min(bucket_count - 1);
        totals[index].push(timing.total * 1000.0);
        if let Some(phase) = timing.phase {
            phases[index].push(phase);
        }
        if outcome.is_success() {
            successes[index] += 1;
        } else {
            errors[index] += 1;
        }
    }

    (0..bucket_count)
        .map(|index| {
            let mut sorted = std::mem::take(&mut totals[index]);
            sorted.sort_by(f64::total_cmp);
            let phase = dominant_phase(&phases[index]).unwrap_or(Phase::Sustain);
            let active_vus = if sorted.is_empty() {
                0
            } else {
                (max_vus as f64 * phase.activity_factor()).round() as u32
            };
            let timestamp = (started_at + ChronoDuration::seconds(index as i64))
                .to_rfc3339_opts(SecondsFormat::Secs, true);

            TimeSeriesBucket {
                bucket: index,
                timestamp,
                active_vus,
                rps: sorted.len() as f64,
                p50: percentile(&sorted, 0.50),
                p95: percentile(&sorted, 0.95),
                p99: percentile(&sorted, 0.99),
                success_count: successes[index],
                error_count: errors[index],
                phase,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ResponseOutcome, SampleTiming};
    use barrage_http::ResponseHeaders;
    use chrono::TimeZone;

    fn collected(points: &[(f64, f64, u16, Phase)]) -> CollectedSamples {
        let mut samples = CollectedSamples::default();
        for (index, &(elapsed, total, status, phase)) in points.iter().enumerate() {
            samples.timings.push(SampleTiming {
                index,
                dns: 0.0,
                connect: 0.0,
                tls: 0.0,
                first_byte: 0.0,
                total,
                elapsed,
                phase: Some(phase),
            });
            samples.outcomes.push(ResponseOutcome {
                index,
                status,
                headers: ResponseHeaders::new(),
                body_size: 0,
                body: None,
                error: None,
            });
        }
        samples
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_run_has_one_bucket() {
        let buckets = bucketize(&CollectedSamples::default(), start(), 10);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].phase, Phase::Sustain);
        assert_eq!(buckets[0].rps, 0.0);
    }

    #[test]
    fn test_gaps_are_filled() {
        let samples = collected(&[
            (0.2, 0.1, 200, Phase::Warmup),
            (3.5, 0.2, 500, Phase::Sustain),
        ]);
        let buckets = bucketize(&samples, start(), 10);

        assert_eq!(buckets.len(), 4);
        let indices: Vec<_> = buckets.iter().map(|b| b.bucket).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(buckets[1].rps, 0.0);
        assert_eq!(buckets[1].phase, Phase::Sustain);
        assert_eq!(buckets[0].success_count, 1);
        assert_eq!(buckets[3].error_count, 1);
        assert_eq!(buckets[2].timestamp, "2026-01-01T12:00:02Z");
    }

    #[test]
    fn test_sample_on_whole_second_lands_in_last_bucket() {
        let samples = collected(&[(2.0, 0.1, 200, Phase::Sustain)]);
        let buckets = bucketize(&samples, start(), 4);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[1].rps, 1.0);
    }

    #[test]
    fn test_dominant_phase_and_active_vus() {
        let samples = collected(&[
            (0.1, 0.1, 200, Phase::Warmup),
            (0.2, 0.1, 200, Phase::Rampup),
            (0.3, 0.1, 200, Phase::Rampup),
            (1.1, 0.1, 200, Phase::Warmup),
            (1.2, 0.1, 200, Phase::Rampup),
        ]);
        let buckets = bucketize(&samples, start(), 10);

        assert_eq!(buckets[0].phase, Phase::Rampup);
        assert_eq!(buckets[0].active_vus, 7);
        // tie resolved by first occurrence
        assert_eq!(buckets[1].phase, Phase::Warmup);
        assert_eq!(buckets[1].active_vus, 3);
    }

    #[test]
    fn test_bucket_percentiles() {
        let samples = collected(&[
            (0.1, 0.1, 200, Phase::Sustain),
            (0.2, 0.3, 200, Phase::Sustain),
            (0.3, 0.2, 200, Phase::Sustain),
        ]);
        let bucket = &bucketize(&samples, start(), 1)[0];
        assert!((bucket.p50 - 200.0).abs() < 1e-9);
        assert!((bucket.p99 - 300.0).abs() < 1e-9);
        assert_eq!(bucket.rps, 3.0);
    }
}
