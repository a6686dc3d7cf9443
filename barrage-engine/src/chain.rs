//! Chain executor
//!
//! Runs an ordered list of dependent requests one at a time. Values extracted
//! from one step's response are stored in a variable table and substituted
//! into `{{name}}` placeholders of later steps.

use crate::assertions::{self, Assertion, AssertionResult, Observed};
use crate::collector::Sample;
use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::jsonpath;
use crate::pool::{Batch, BodyRetention, ExecutionPool};
use crate::sample::ResponseOutcome;
use barrage_http::{AuthSpec, Headers, HttpMethod, HttpTransport, RequestSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Variable table shared by the steps of a chain
pub type Variables = BTreeMap<String, Value>;

/// Where an extraction rule reads its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractSource {
    Body,
    Header,
    Status,
}

/// Store a value from a step's response under `variable_name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRule {
    #[serde(alias = "name", alias = "variable")]
    pub variable_name: String,
    pub source: ExtractSource,
    /// JSON path for `body`, header name for `header`, unused for `status`
    #[serde(default)]
    pub path: String,
}

/// One request of a chain. String fields may contain `{{name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub auth: Option<AuthSpec>,
    #[serde(default, alias = "extract", alias = "extractions")]
    pub extraction_rules: Vec<ExtractionRule>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Stop the chain when this step fails. When unset, a transport failure
    /// stops the chain and an error status does not.
    #[serde(default)]
    pub stop_on_error: Option<bool>,
}

/// Chain run input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRequest {
    pub steps: Vec<ChainStep>,
    #[serde(default, alias = "variables")]
    pub global_variables: Variables,
}

/// Result of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub id: String,
    pub name: String,
    /// URL after placeholder substitution
    pub url: String,
    pub method: HttpMethod,
    /// HTTP status, 0 when the request never completed
    pub status: u16,
    pub success: bool,
    /// Milliseconds
    pub duration: f64,
    pub body_size: usize,
    pub extracted: Variables,
    pub assertions: Vec<AssertionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a whole chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResult {
    pub success: bool,
    pub steps: Vec<StepResult>,
    pub variables: Variables,
    /// Sum of step durations, milliseconds
    pub total_duration: f64,
}

/// Replace every `{{name}}` whose name is in `variables`; unknown
/// placeholders stay as written
pub fn substitute(template: &str, variables: &Variables) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    let mut resolved = template.to_string();
    for (name, value) in variables {
        let placeholder = format!("{{{{{}}}}}", name);
        if resolved.contains(&placeholder) {
            resolved = resolved.replace(&placeholder, &assertions::text(value));
        }
    }
    resolved
}

/// Read one extraction rule's value from a response, `null` when absent
pub fn extract(rule: &ExtractionRule, outcome: &ResponseOutcome) -> Value {
    match rule.source {
        ExtractSource::Body => outcome
            .body
            .as_deref()
            .map(|body| jsonpath::lookup_in_body(body, &rule.path))
            .unwrap_or(Value::Null),
        ExtractSource::Header => outcome
            .headers
            .first(rule.path.trim())
            .map(|value| Value::String(value.to_string()))
            .unwrap_or(Value::Null),
        ExtractSource::Status => Value::from(outcome.status),
    }
}

/// Runs chains step by step through a single-request pool
#[derive(Clone)]
pub struct ChainExecutor {
    pool: ExecutionPool,
    default_timeout: Duration,
}

impl ChainExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, default_timeout: Duration) -> Self {
        Self {
            pool: ExecutionPool::new(transport).with_retention(BodyRetention::All),
            default_timeout,
        }
    }

    pub async fn execute(&self, request: &ChainRequest) -> ChainResult {
        let mut ctx = RunContext::new();
        let span = info_span!("chain", run_id = %ctx.run_id(), steps = request.steps.len());
        self.execute_steps(&mut ctx, request).instrument(span).await
    }

    async fn execute_steps(&self, ctx: &mut RunContext, request: &ChainRequest) -> ChainResult {
        let mut variables = request.global_variables.clone();
        let mut steps = Vec::with_capacity(request.steps.len());

        for (position, step) in request.steps.iter().enumerate() {
            let (result, stop) = self.execute_step(ctx, step, &mut variables).await;
            debug!(
                "Step {} ({}) finished with status {} in {:.1}ms",
                position, result.name, result.status, result.duration
            );
            steps.push(result);

            if stop {
                info!("Stopping chain after failed step {}", position);
                break;
            }
        }

        let success = steps.iter().all(|s| s.success);
        let total_duration = steps.iter().map(|s| s.duration).sum();
        info!(
            "Chain finished: {} of {} steps run, success: {}",
            steps.len(),
            request.steps.len(),
            success
        );

        ChainResult {
            success,
            steps,
            variables,
            total_duration,
        }
    }

    /// Run one step, returning its result and whether the chain should stop
    async fn execute_step(
        &self,
        ctx: &mut RunContext,
        step: &ChainStep,
        variables: &mut Variables,
    ) -> (StepResult, bool) {
        let url = substitute(&step.url, variables);
        let mut result = StepResult {
            id: step.id.clone(),
            name: step.name.clone(),
            url: url.clone(),
            method: step.method,
            status: 0,
            success: false,
            duration: 0.0,
            body_size: 0,
            extracted: Variables::new(),
            assertions: Vec::new(),
            error: None,
        };
        let stop_on_exception = step.stop_on_error.unwrap_or(true);

        let sample = match self.send(ctx, step, &url, variables).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Step '{}' could not be sent: {}", step.name, e);
                result.error = Some(e.to_string());
                return (result, stop_on_exception);
            }
        };

        let outcome = &sample.outcome;
        result.duration = sample.timing.total * 1000.0;

        if outcome.is_transport_failure() {
            result.error = outcome.error.clone();
            return (result, stop_on_exception);
        }

        result.status = outcome.status;
        result.body_size = outcome.body_size;
        result.success = outcome.is_success();

        if result.success {
            for rule in &step.extraction_rules {
                let value = extract(rule, outcome);
                if value.is_null() {
                    debug!("Extraction of '{}' found nothing", rule.variable_name);
                    continue;
                }
                variables.insert(rule.variable_name.clone(), value.clone());
                result.extracted.insert(rule.variable_name.clone(), value);
            }
        }

        result.assertions = assertions::evaluate(
            &step.assertions,
            &Observed {
                status: outcome.status,
                headers: &outcome.headers,
                body: outcome.body.as_deref(),
                mean_ms: result.duration,
            },
        );

        let stop = !result.success && step.stop_on_error.unwrap_or(false);
        (result, stop)
    }

    async fn send(
        &self,
        ctx: &mut RunContext,
        step: &ChainStep,
        url: &str,
        variables: &Variables,
    ) -> EngineResult<Sample> {
        let mut headers: Headers = step
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), substitute(value, variables)))
            .collect();
        if let Some(auth) = &step.auth {
            auth.map_values(|value| substitute(value, variables))
                .apply(&mut headers);
        }

        let timeout = step
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let mut spec = RequestSpec::new(url)?
            .with_method(step.method)
            .with_headers(headers)
            .with_timeout(timeout);
        if let Some(body) = &step.body {
            spec = spec.with_body(substitute(body, variables));
        }

        let batch = self.pool.run_batch(ctx, &spec, &Batch::single()).await?;
        batch
            .samples
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Internal("pool returned no sample".to_string()))
    }
}
