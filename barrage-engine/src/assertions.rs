//! Assertion evaluation
//!
//! Assertions check one observed response plus an aggregate mean latency.
//! Evaluation never fails the caller: unknown types or operators produce a
//! failed result, and an unexpected error while evaluating the batch is
//! replaced by a single failed result describing it.

use crate::error::{EngineError, EngineResult};
use crate::jsonpath;
use barrage_http::ResponseHeaders;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use tracing::warn;

/// What an assertion inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssertionKind {
    StatusCode,
    ResponseTime,
    JsonPath,
    Header,
    Unknown(String),
}

impl From<String> for AssertionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "status_code" => Self::StatusCode,
            "response_time" => Self::ResponseTime,
            "json_path" => Self::JsonPath,
            "header" => Self::Header,
            _ => Self::Unknown(value),
        }
    }
}

impl From<AssertionKind> for String {
    fn from(kind: AssertionKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusCode => f.write_str("status_code"),
            Self::ResponseTime => f.write_str("response_time"),
            Self::JsonPath => f.write_str("json_path"),
            Self::Header => f.write_str("header"),
            Self::Unknown(other) => f.write_str(other),
        }
    }
}

/// How the actual value is compared with the expected one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
    Neq,
    Exists,
    NotExists,
    Unknown(String),
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "equals" => Self::Equals,
            "contains" => Self::Contains,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "neq" => Self::Neq,
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Neq => "neq",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Unknown(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

/// A user-defined pass/fail check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: AssertionKind,
    /// JSON path or header name
    #[serde(default, alias = "field", alias = "path")]
    pub field_path: Option<String>,
    pub operator: Operator,
    #[serde(default, alias = "expected")]
    pub expected_value: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Assertion {
    pub fn new(kind: AssertionKind, operator: Operator, expected: impl Into<Value>) -> Self {
        Self {
            kind,
            field_path: None,
            operator,
            expected_value: expected.into(),
            enabled: true,
        }
    }

    pub fn with_field(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }
}

/// Outcome of one assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    #[serde(rename = "type")]
    pub kind: AssertionKind,
    pub operator: Operator,
    pub expected: Value,
    pub actual: Value,
    pub passed: bool,
    pub message: String,
}

/// The response an assertion batch is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct Observed<'a> {
    pub status: u16,
    pub headers: &'a ResponseHeaders,
    pub body: Option<&'a [u8]>,
    /// Mean latency in milliseconds
    pub mean_ms: f64,
}

/// Evaluate every enabled assertion
pub fn evaluate(assertions: &[Assertion], observed: &Observed<'_>) -> Vec<AssertionResult> {
    let results: EngineResult<Vec<_>> = assertions
        .iter()
        .filter(|a| a.enabled)
        .map(|a| evaluate_one(a, observed))
        .collect();

    match results {
        Ok(results) => results,
        Err(e) => {
            warn!("Assertion evaluation failed: {}", e);
            vec![AssertionResult {
                kind: AssertionKind::Unknown("evaluation".to_string()),
                operator: Operator::Unknown("evaluation".to_string()),
                expected: Value::Null,
                actual: Value::Null,
                passed: false,
                message: format!("Assertion evaluation failed: {}", e),
            }]
        }
    }
}

/// Number of passing results
pub fn passed_count(results: &[AssertionResult]) -> usize {
    results.iter().filter(|r| r.passed).count()
}

fn evaluate_one(assertion: &Assertion, observed: &Observed<'_>) -> EngineResult<AssertionResult> {
    let field = assertion.field_path.as_deref().unwrap_or("").trim();

    let actual = match &assertion.kind {
        AssertionKind::StatusCode => Value::from(observed.status),
        AssertionKind::ResponseTime => Number::from_f64(observed.mean_ms)
            .map(Value::Number)
            .ok_or_else(|| {
                EngineError::Evaluation(format!(
                    "mean response time is not a finite number: {}",
                    observed.mean_ms
                ))
            })?,
        AssertionKind::JsonPath => jsonpath::lookup_in_body(observed.body.unwrap_or_default(), field),
        AssertionKind::Header => observed
            .headers
            .joined(field)
            .map(Value::String)
            .unwrap_or(Value::Null),
        AssertionKind::Unknown(kind) => {
            return Ok(failed(
                assertion,
                Value::Null,
                format!("Unknown assertion type '{}'", kind),
            ))
        }
    };

    let supports_presence = matches!(
        assertion.kind,
        AssertionKind::JsonPath | AssertionKind::Header
    );
    let expected = &assertion.expected_value;

    let passed = match &assertion.operator {
        Operator::Equals => loose_eq(&actual, expected),
        Operator::Neq => !loose_eq(&actual, expected),
        Operator::Contains => text(&actual).contains(&text(expected)),
        Operator::Gt => compare(&actual, expected, |a, b| a > b),
        Operator::Lt => compare(&actual, expected, |a, b| a < b),
        Operator::Gte => compare(&actual, expected, |a, b| a >= b),
        Operator::Lte => compare(&actual, expected, |a, b| a <= b),
        Operator::Exists | Operator::NotExists if !supports_presence => {
            return Ok(failed(
                assertion,
                actual,
                format!(
                    "Operator '{}' is not supported for {} assertions",
                    assertion.operator, assertion.kind
                ),
            ))
        }
        Operator::Exists => !actual.is_null(),
        Operator::NotExists => actual.is_null(),
        Operator::Unknown(operator) => {
            return Ok(failed(
                assertion,
                actual,
                format!("Unknown operator '{}'", operator),
            ))
        }
    };

    let subject = if supports_presence && !field.is_empty() {
        format!("{} '{}'", assertion.kind, field)
    } else {
        assertion.kind.to_string()
    };
    let message = format!(
        "{} {} {}: {} (actual: {})",
        subject,
        assertion.operator,
        text(expected),
        if passed { "passed" } else { "failed" },
        display(&actual)
    );

    Ok(AssertionResult {
        kind: assertion.kind.clone(),
        operator: assertion.operator.clone(),
        expected: expected.clone(),
        actual,
        passed,
        message,
    })
}

fn failed(assertion: &Assertion, actual: Value, message: String) -> AssertionResult {
    AssertionResult {
        kind: assertion.kind.clone(),
        operator: assertion.operator.clone(),
        expected: assertion.expected_value.clone(),
        actual,
        passed: false,
        message,
    }
}

/// String form used by `contains` and placeholder substitution
pub fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => text(other),
    }
}

/// Numeric reading of a value, accepting numeric strings
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Equality that treats `200` and `"200"` alike
pub fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a == b;
    }
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, other) | (other, Value::Null) => text(other).is_empty(),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(a), Value::String(s)) | (Value::String(s), Value::Bool(a)) => {
            s.trim().eq_ignore_ascii_case(if *a { "true" } else { "false" })
        }
        (Value::String(a), Value::String(b)) => a == b,
        (a, b) => a == b,
    }
}

/// Ordering comparison, only between values that read as numbers
fn compare(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}
