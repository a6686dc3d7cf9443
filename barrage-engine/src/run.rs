//! Run boundary: request validation, orchestration and reporting

use crate::assertions::{self, Assertion, Observed};
use crate::chain::{ChainExecutor, ChainRequest, ChainResult};
use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::plan::{LoadPlan, PhaseDurations};
use crate::pool::ExecutionPool;
use crate::report::{LoadTestReport, RunResponse, RunSummary};
use crate::scheduler::PhaseScheduler;
use crate::sink::{JsonLinesSink, NullSink, ResultSink, RunRecord};
use crate::stats;
use crate::timeseries;
use barrage_config::{BarrageConfig, EngineConfig, LimitPolicy, OutputConfig};
use barrage_http::{
    AuthSpec, Headers, HttpError, HttpMethod, HttpTransport, ReqwestTransport, RequestSpec,
    TransportConfig,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Phase settings as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPhaseConfig {
    #[serde(default)]
    pub enable_phased_load: bool,
    #[serde(default)]
    pub warmup_duration: i64,
    #[serde(
        default = "default_warmup_percent",
        rename = "warmupVUsPercent",
        alias = "warmupVusPercent"
    )]
    pub warmup_vus_percent: i64,
    #[serde(default)]
    pub ramp_up_duration: i64,
    #[serde(default)]
    pub sustain_duration: i64,
    #[serde(default)]
    pub ramp_down_duration: i64,
}

fn default_warmup_percent() -> i64 {
    LoadPlan::DEFAULT_WARMUP_PERCENT as i64
}

impl Default for LoadPhaseConfig {
    fn default() -> Self {
        Self {
            enable_phased_load: false,
            warmup_duration: 0,
            warmup_vus_percent: default_warmup_percent(),
            ramp_up_duration: 0,
            sustain_duration: 0,
            ramp_down_duration: 0,
        }
    }
}

/// Load run input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub concurrency: Option<i64>,
    #[serde(default)]
    pub iterations: Option<i64>,
    #[serde(default)]
    pub bypass_cache: bool,
    /// Per-request timeout, seconds
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub load_phase_config: Option<LoadPhaseConfig>,
    #[serde(default)]
    pub auth: Option<AuthSpec>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl LoadTestRequest {
    pub const DEFAULT_CONCURRENCY: i64 = 10;
    pub const DEFAULT_ITERATIONS: i64 = 10;

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// A validated run, ready to schedule
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub request: RequestSpec,
    pub plan: LoadPlan,
    pub assertions: Vec<Assertion>,
}

/// Keep `value` within `[min, max]`, clamping or rejecting per `policy`
fn bound(field: &str, value: i64, min: i64, max: i64, policy: LimitPolicy) -> EngineResult<i64> {
    if (min..=max).contains(&value) {
        return Ok(value);
    }
    match policy {
        LimitPolicy::Clamp => {
            let clamped = value.clamp(min, max);
            debug!("Clamped {} from {} to {}", field, value, clamped);
            Ok(clamped)
        }
        LimitPolicy::Reject => Err(EngineError::validation(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        ))),
    }
}

/// Validate a run request against the engine limits
pub fn resolve(request: &LoadTestRequest, limits: &EngineConfig) -> EngineResult<ResolvedRun> {
    if request.url.trim().is_empty() {
        return Err(EngineError::validation("url is required"));
    }

    let method = match request.method.as_deref().map(str::trim) {
        None | Some("") => HttpMethod::Get,
        Some(raw) => raw
            .parse::<HttpMethod>()
            .map_err(HttpError::from)?,
    };

    let policy = limits.limit_policy;
    let concurrency = bound(
        "concurrency",
        request.concurrency.unwrap_or(LoadTestRequest::DEFAULT_CONCURRENCY),
        1,
        limits.max_concurrency as i64,
        policy,
    )?;
    let iterations = bound(
        "iterations",
        request.iterations.unwrap_or(LoadTestRequest::DEFAULT_ITERATIONS),
        1,
        limits.max_iterations as i64,
        policy,
    )?;
    let timeout = bound(
        "timeout",
        request
            .timeout
            .unwrap_or(limits.default_timeout_secs as i64),
        limits.min_timeout_secs as i64,
        limits.max_timeout_secs as i64,
        policy,
    )?;

    let phases = request.load_phase_config.clone().unwrap_or_default();
    let seconds = |field: &str, value: i64| -> EngineResult<u32> {
        Ok(bound(field, value, 0, u32::MAX as i64, policy)? as u32)
    };
    let (durations, warmup_percent) = if phases.enable_phased_load {
        let durations = PhaseDurations {
            warmup: seconds("warmupDuration", phases.warmup_duration)?,
            ramp_up: seconds("rampUpDuration", phases.ramp_up_duration)?,
            sustain: seconds("sustainDuration", phases.sustain_duration)?,
            ramp_down: seconds("rampDownDuration", phases.ramp_down_duration)?,
        };
        let percent = bound(
            "warmupVUsPercent",
            phases.warmup_vus_percent,
            LoadPlan::MIN_WARMUP_PERCENT as i64,
            LoadPlan::MAX_WARMUP_PERCENT as i64,
            policy,
        )?;
        (durations, percent as u32)
    } else {
        (PhaseDurations::default(), LoadPlan::DEFAULT_WARMUP_PERCENT)
    };

    let plan = LoadPlan::new(concurrency as u32, iterations as u32)
        .with_phases(durations, warmup_percent);
    plan.validate(limits)?;

    let mut headers: Headers = request.headers.clone().into();
    if let Some(auth) = &request.auth {
        auth.apply(&mut headers);
    }

    let mut spec = RequestSpec::new(&request.url)?
        .with_method(method)
        .with_headers(headers)
        .with_timeout(Duration::from_secs(timeout as u64))
        .with_bypass_cache(request.bypass_cache);
    if let Some(body) = &request.body {
        spec = spec.with_body(body.clone());
    }

    Ok(ResolvedRun {
        request: spec,
        plan,
        assertions: request.assertions.clone(),
    })
}

#[derive(Clone)]
enum TransportSource {
    /// Build a new client for every run
    PerRun(TransportConfig),
    Shared(Arc<dyn HttpTransport>),
}

/// Executes load runs and chains with a fixed configuration
#[derive(Clone)]
pub struct LoadTestRunner {
    engine: EngineConfig,
    output: OutputConfig,
    transport: TransportSource,
    sink: Arc<dyn ResultSink>,
}

impl LoadTestRunner {
    pub fn new(config: &BarrageConfig) -> Self {
        let sink: Arc<dyn ResultSink> = match &config.output.results_path {
            Some(path) => Arc::new(JsonLinesSink::new(path.clone())),
            None => Arc::new(NullSink),
        };

        Self {
            engine: config.engine.clone(),
            output: config.output.clone(),
            transport: TransportSource::PerRun(config.http.clone().into()),
            sink,
        }
    }

    /// Use one transport for every run instead of building a client per run
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = TransportSource::Shared(transport);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    fn transport(&self) -> EngineResult<Arc<dyn HttpTransport>> {
        match &self.transport {
            TransportSource::PerRun(config) => Ok(Arc::new(ReqwestTransport::new(config)?)),
            TransportSource::Shared(transport) => Ok(Arc::clone(transport)),
        }
    }

    /// Run a load test. Never fails: every problem is reported as
    /// [`RunResponse::Failed`].
    pub async fn run(&self, request: &LoadTestRequest) -> RunResponse {
        let ctx = RunContext::new();
        let span = info_span!("load_test", run_id = %ctx.run_id(), url = %request.url);

        match self.execute(ctx, request).instrument(span).await {
            Ok(response) => response,
            Err(e @ (EngineError::Validation(_) | EngineError::Transport(_))) => {
                warn!("Load test rejected: {}", e);
                RunResponse::failed(e.to_string())
            }
            Err(e) => {
                error!("Load test failed: {}", e);
                RunResponse::failed("Internal error while running the load test")
            }
        }
    }

    async fn execute(
        &self,
        mut ctx: RunContext,
        request: &LoadTestRequest,
    ) -> EngineResult<RunResponse> {
        let resolved = resolve(request, &self.engine)?;
        let pool = ExecutionPool::new(self.transport()?);
        let scheduler = PhaseScheduler::new(self.engine.pacing_delay);
        let phase_plan = scheduler.plan(&resolved.plan);

        info!(
            "Starting load test: {} {} with {} VUs x {} iterations in {} batches",
            resolved.request.method,
            resolved.request.url,
            resolved.plan.max_vus,
            resolved.plan.iterations_per_vu,
            phase_plan.len()
        );

        let collector = scheduler
            .execute(&phase_plan, &pool, &mut ctx, &resolved.request)
            .await?;
        let samples = collector.finish();
        let duration = ctx.elapsed().as_secs_f64();

        let mut record = RunRecord {
            run_id: ctx.run_id(),
            url: request.url.clone(),
            method: resolved.request.method.to_string(),
            status: samples.outcomes.first().map_or(0, |o| o.status),
            duration,
            statistics: None,
            error: None,
            timestamp: Utc::now(),
        };

        let aggregate = match stats::aggregate(&samples) {
            Ok(aggregate) => aggregate,
            Err(e) => {
                warn!("Load test produced no statistics: {}", e);
                record.error = Some(e.to_string());
                self.record(&record).await;
                return Ok(RunResponse::failed(e.to_string()));
            }
        };

        let time_series = timeseries::bucketize(&samples, ctx.started_at(), resolved.plan.max_vus);
        let summary = RunSummary {
            run_id: ctx.run_id(),
            url: request.url.clone(),
            method: resolved.request.method.to_string(),
            concurrency: resolved.plan.max_vus,
            iterations: resolved.plan.iterations_per_vu,
            timeout: resolved.request.timeout.as_secs(),
            bypass_cache: resolved.request.bypass_cache,
            phased: resolved.plan.is_phased(),
            batches: phase_plan.len(),
            planned_requests: phase_plan.planned_requests(),
            dispatched_requests: ctx.dispatched(),
            duration,
            started_at: ctx.started_at().to_rfc3339_opts(SecondsFormat::Millis, true),
            phases: phase_plan.windows(),
        };

        info!(
            "Load test finished: {} requests, {} errors, mean {:.1}ms in {:.2}s",
            aggregate.stats.requests, aggregate.stats.error_count, aggregate.stats.mean, duration
        );

        record.statistics = Some(aggregate.stats.clone());
        let mean_ms = aggregate.stats.mean;
        let mut report = LoadTestReport::new(
            &samples,
            aggregate,
            summary,
            time_series,
            self.output.include_requests,
        );

        if !resolved.assertions.is_empty() {
            if let Some(first) = samples.outcomes.first() {
                let results = assertions::evaluate(
                    &resolved.assertions,
                    &Observed {
                        status: first.status,
                        headers: &first.headers,
                        body: first.body.as_deref(),
                        mean_ms,
                    },
                );
                report = report.with_assertions(results);
            }
        }

        self.record(&record).await;
        Ok(RunResponse::Completed(Box::new(report)))
    }

    async fn record(&self, record: &RunRecord) {
        if let Err(e) = self.sink.record(record).await {
            warn!("Failed to record run {}: {}", record.run_id, e);
        }
    }

    /// Run a chain of dependent requests
    pub async fn run_chain(&self, request: &ChainRequest) -> EngineResult<ChainResult> {
        let executor = ChainExecutor::new(
            self.transport()?,
            Duration::from_secs(self.engine.default_timeout_secs),
        );
        Ok(executor.execute(request).await)
    }
}
