//! Statistics aggregation over the samples of a run

use crate::collector::CollectedSamples;
use crate::sample::{ResponseOutcome, SampleTiming};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response headers that report a cache hit or miss
pub const CACHE_STATUS_HEADERS: [&str; 3] = ["x-cache-status", "x-cache", "cf-cache-status"];

/// Latency and error figures for a run. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStatistics {
    pub requests: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Percentage of requests without a 2xx/3xx status
    pub error_rate: f64,
    pub rps: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// Average time spent in each stage of a request, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BottleneckBreakdown {
    pub dns: f64,
    pub tcp: f64,
    pub tls: f64,
    pub server: f64,
    pub download: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadStatus {
    Passed,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StressStatus {
    Stable,
    Degraded,
    Breaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LatencyStatus {
    Excellent,
    Acceptable,
    Slow,
}

/// Cold start analysis and qualitative labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestingSummary {
    pub cold_start_time: f64,
    pub warm_average: f64,
    pub cold_warm_ratio: f64,
    pub load_status: LoadStatus,
    pub stress_status: StressStatus,
    pub latency_status: LatencyStatus,
}

/// Everything the aggregator derives from a run
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub stats: TestStatistics,
    pub bottleneck: BottleneckBreakdown,
    pub testing: TestingSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no results collected")]
    NoResults,

    /// The first request failed at transport level
    #[error("{0}")]
    FirstRequestFailed(String),
}

/// Percentile of an ascending slice, `p` in [0, 1]. 0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index]
}

/// Median of an ascending slice. 0 for an empty slice.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 0 => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
        _ => sorted[n / 2],
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn to_ms(seconds: f64) -> f64 {
    seconds * 1000.0
}

/// Cache verdict from the first recognised cache-status header
pub fn cache_status(outcome: &ResponseOutcome) -> Option<bool> {
    CACHE_STATUS_HEADERS.iter().find_map(|name| {
        outcome
            .headers
            .first(name)
            .and_then(|value| match value.trim() {
                "HIT" => Some(true),
                "MISS" => Some(false),
                _ => None,
            })
    })
}

/// Compute statistics for a run.
///
/// A transport failure on dispatch index 0 fails the whole run before any
/// metric is computed.
pub fn aggregate(samples: &CollectedSamples) -> Result<Aggregate, AggregationError> {
    let first = samples.outcomes.first().ok_or(AggregationError::NoResults)?;
    if first.is_transport_failure() {
        return Err(AggregationError::FirstRequestFailed(
            first.error.clone().unwrap_or_default(),
        ));
    }

    let stats = statistics(samples);
    let bottleneck = bottleneck(&samples.timings);
    let testing = testing_summary(&samples.timings, &stats);

    Ok(Aggregate {
        stats,
        bottleneck,
        testing,
    })
}

pub fn statistics(samples: &CollectedSamples) -> TestStatistics {
    let n = samples.len();
    if n == 0 {
        return TestStatistics::default();
    }

    let mut sorted: Vec<f64> = samples.timings.iter().map(|t| to_ms(t.total)).collect();
    sorted.sort_by(f64::total_cmp);

    let sum: f64 = sorted.iter().sum();
    let mean = sum / n as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

    let success_count = samples.outcomes.iter().filter(|o| o.is_success()).count();
    let error_count = n - success_count;

    let total_seconds: f64 = samples.timings.iter().map(|t| t.total).sum();
    let rps = if total_seconds > 0.0 {
        n as f64 / total_seconds
    } else {
        0.0
    };

    let mut cache_hits = 0;
    let mut cache_misses = 0;
    for outcome in &samples.outcomes {
        match cache_status(outcome) {
            Some(true) => cache_hits += 1,
            Some(false) => cache_misses += 1,
            None => {}
        }
    }

    TestStatistics {
        requests: n,
        success_count,
        error_count,
        error_rate: error_count as f64 / n as f64 * 100.0,
        rps,
        mean,
        median: median(&sorted),
        min: sorted[0],
        max: sorted[n - 1],
        std_dev: variance.sqrt(),
        p50: percentile(&sorted, 0.50),
        p75: percentile(&sorted, 0.75),
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
        cache_hits,
        cache_misses,
    }
}

/// Averages of each cumulative milestone, split into legs
pub fn bottleneck(timings: &[SampleTiming]) -> BottleneckBreakdown {
    let dns = mean(timings.iter().map(|t| t.dns));
    let connect = mean(timings.iter().map(|t| t.connect));
    let tls = mean(timings.iter().map(|t| t.tls));
    let first_byte = mean(timings.iter().map(|t| t.first_byte));
    let total = mean(timings.iter().map(|t| t.total));

    BottleneckBreakdown {
        dns: to_ms(dns).max(0.0),
        tcp: to_ms(connect - dns).max(0.0),
        tls: to_ms(tls - connect).max(0.0),
        server: to_ms(first_byte - tls.max(connect)).max(0.0),
        download: to_ms(total - first_byte).max(0.0),
    }
}

pub fn testing_summary(timings: &[SampleTiming], stats: &TestStatistics) -> TestingSummary {
    let cold_start_time = timings.first().map(|t| to_ms(t.total)).unwrap_or(0.0);
    let warm_average = if timings.len() > 1 {
        mean(timings[1..].iter().map(|t| to_ms(t.total)))
    } else {
        cold_start_time
    };
    let cold_warm_ratio = if warm_average > 0.0 {
        cold_start_time / warm_average
    } else {
        1.0
    };

    TestingSummary {
        cold_start_time,
        warm_average,
        cold_warm_ratio,
        load_status: load_status(stats.error_rate),
        stress_status: stress_status(stats.max, stats.error_rate),
        latency_status: latency_status(stats.mean),
    }
}

pub fn load_status(error_rate: f64) -> LoadStatus {
    if error_rate < 1.0 {
        LoadStatus::Passed
    } else if error_rate < 5.0 {
        LoadStatus::Warning
    } else {
        LoadStatus::Failed
    }
}

pub fn stress_status(max_ms: f64, error_rate: f64) -> StressStatus {
    if max_ms < 1000.0 && error_rate < 5.0 {
        StressStatus::Stable
    } else if max_ms < 2000.0 {
        StressStatus::Degraded
    } else {
        StressStatus::Breaking
    }
}

pub fn latency_status(mean_ms: f64) -> LatencyStatus {
    if mean_ms < 200.0 {
        LatencyStatus::Excellent
    } else if mean_ms < 500.0 {
        LatencyStatus::Acceptable
    } else {
        LatencyStatus::Slow
    }
}
