//! Load test report and run response shapes

use crate::assertions::{self, AssertionResult};
use crate::collector::CollectedSamples;
use crate::plan::{Phase, PhaseWindow};
use crate::sample::{ResponseOutcome, SampleTiming};
use crate::stats::{Aggregate, BottleneckBreakdown, TestStatistics, TestingSummary};
use crate::timeseries::TimeSeriesBucket;
use barrage_http::ResponseHeaders;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Response latencies in dispatch order, for plotting
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    /// Dispatch indices
    pub labels: Vec<usize>,
    /// Total time per request, milliseconds
    pub response_times: Vec<f64>,
    /// Count of responses per status code, 0 for transport failures
    pub status_codes: BTreeMap<u16, usize>,
}

impl ChartData {
    pub fn from_samples(samples: &CollectedSamples) -> Self {
        let mut chart = ChartData::default();
        for (timing, outcome) in samples.iter() {
            chart.labels.push(timing.index);
            chart.response_times.push(timing.total * 1000.0);
            *chart.status_codes.entry(outcome.status).or_insert(0) += 1;
        }
        chart
    }
}

/// The response to dispatch index 0
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ResponseOutcome> for FirstResponse {
    fn from(outcome: &ResponseOutcome) -> Self {
        Self {
            status: outcome.status,
            headers: outcome.headers.clone(),
            body_size: outcome.body_size,
            body: outcome
                .body
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).into_owned()),
            error: outcome.error.clone(),
        }
    }
}

/// Timing breakdown of one request, legs in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBreakdown {
    pub index: usize,
    pub status: u16,
    pub phase: Option<Phase>,
    /// Seconds from run start to completion
    pub elapsed: f64,
    pub dns: f64,
    pub tcp: f64,
    pub tls: f64,
    pub server: f64,
    pub download: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestBreakdown {
    pub fn new(timing: &SampleTiming, outcome: &ResponseOutcome) -> Self {
        let legs = timing.legs();
        Self {
            index: timing.index,
            status: outcome.status,
            phase: timing.phase,
            elapsed: timing.elapsed,
            dns: legs.dns * 1000.0,
            tcp: legs.tcp * 1000.0,
            tls: legs.tls * 1000.0,
            server: legs.server * 1000.0,
            download: legs.download * 1000.0,
            total: legs.total * 1000.0,
            error: outcome.error.clone(),
        }
    }
}

/// How the run was configured and how it went
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub url: String,
    pub method: String,
    pub concurrency: u32,
    pub iterations: u32,
    /// Per-request timeout, seconds
    pub timeout: u64,
    pub bypass_cache: bool,
    pub phased: bool,
    pub batches: usize,
    pub planned_requests: u64,
    pub dispatched_requests: usize,
    /// Wall-clock seconds
    pub duration: f64,
    pub started_at: String,
    pub phases: Vec<PhaseWindow>,
}

/// Full report of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestReport {
    pub stats: TestStatistics,
    pub testing: TestingSummary,
    pub chart_data: ChartData,
    pub bottleneck: BottleneckBreakdown,
    pub first_response: Option<FirstResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<RequestBreakdown>>,
    pub summary: RunSummary,
    pub time_series: Vec<TimeSeriesBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertions: Option<Vec<AssertionResult>>,
    #[serde(rename = "assertions_passed", skip_serializing_if = "Option::is_none")]
    pub assertions_passed: Option<usize>,
    #[serde(rename = "assertions_total", skip_serializing_if = "Option::is_none")]
    pub assertions_total: Option<usize>,
}

impl LoadTestReport {
    pub fn new(
        samples: &CollectedSamples,
        aggregate: Aggregate,
        summary: RunSummary,
        time_series: Vec<TimeSeriesBucket>,
        include_requests: bool,
    ) -> Self {
        let requests = include_requests.then(|| {
            samples
                .iter()
                .map(|(timing, outcome)| RequestBreakdown::new(timing, outcome))
                .collect()
        });

        Self {
            stats: aggregate.stats,
            testing: aggregate.testing,
            chart_data: ChartData::from_samples(samples),
            bottleneck: aggregate.bottleneck,
            first_response: samples.outcomes.first().map(FirstResponse::from),
            requests,
            summary,
            time_series,
            assertions: None,
            assertions_passed: None,
            assertions_total: None,
        }
    }

    pub fn with_assertions(mut self, results: Vec<AssertionResult>) -> Self {
        self.assertions_passed = Some(assertions::passed_count(&results));
        self.assertions_total = Some(results.len());
        self.assertions = Some(results);
        self
    }
}

/// What a load run returns: a report, or an error with no statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunResponse {
    Completed(Box<LoadTestReport>),
    Failed { error: String },
}

impl RunResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn report(&self) -> Option<&LoadTestReport> {
        match self {
            Self::Completed(report) => Some(report.as_ref()),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Failed { error } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;
    use serde_json::json;

    fn samples() -> CollectedSamples {
        let mut samples = CollectedSamples::default();
        for (index, status) in [(0usize, 200u16), (1, 200), (2, 0)] {
            samples.timings.push(SampleTiming {
                index,
                dns: 0.001,
                connect: 0.002,
                tls: 0.002,
                first_byte: 0.010,
                total: 0.012,
                elapsed: 0.1 * (index + 1) as f64,
                phase: Some(Phase::Sustain),
            });
            let mut outcome = ResponseOutcome::failed(index, "connect error: refused");
            if status != 0 {
                outcome.status = status;
                outcome.error = None;
                outcome.body_size = 2;
                outcome.body = (index == 0).then(|| bytes::Bytes::from_static(b"ok"));
            }
            samples.outcomes.push(outcome);
        }
        samples
    }

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::nil(),
            url: "http://example.test/".to_string(),
            method: "GET".to_string(),
            concurrency: 3,
            iterations: 1,
            timeout: 30,
            bypass_cache: false,
            phased: false,
            batches: 1,
            planned_requests: 3,
            dispatched_requests: 3,
            duration: 0.3,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            phases: Vec::new(),
        }
    }

    #[test]
    fn test_report_sections_serialize() {
        let samples = samples();
        let aggregate = stats::aggregate(&samples).unwrap();
        let report = LoadTestReport::new(&samples, aggregate, summary(), Vec::new(), true)
            .with_assertions(Vec::new());
        let value = serde_json::to_value(RunResponse::Completed(Box::new(report))).unwrap();

        assert_eq!(value["stats"]["requests"], json!(3));
        assert_eq!(value["stats"]["errorCount"], json!(1));
        assert_eq!(value["chartData"]["labels"], json!([0, 1, 2]));
        assert_eq!(value["chartData"]["statusCodes"]["200"], json!(2));
        assert_eq!(value["firstResponse"]["body"], json!("ok"));
        assert_eq!(value["requests"].as_array().unwrap().len(), 3);
        assert_eq!(value["requests"][2]["error"], json!("connect error: refused"));
        assert_eq!(value["testing"]["loadStatus"], json!("FAILED"));
        assert_eq!(value["assertions_total"], json!(0));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_requests_section_can_be_omitted() {
        let samples = samples();
        let aggregate = stats::aggregate(&samples).unwrap();
        let report = LoadTestReport::new(&samples, aggregate, summary(), Vec::new(), false);
        let value = serde_json::to_value(&report).unwrap();

        assert!(value.get("requests").is_none());
        assert!(value.get("assertions").is_none());
    }

    #[test]
    fn test_failed_response_has_only_error() {
        let value = serde_json::to_value(RunResponse::failed("dns error")).unwrap();
        assert_eq!(value, json!({"error": "dns error"}));
    }
}
