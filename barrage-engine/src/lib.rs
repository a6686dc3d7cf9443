//! Load engine for Barrage
//!
//! A run is resolved against the engine limits into a [`LoadPlan`], split by
//! the [`PhaseScheduler`] into per-second batches, and executed through a
//! bounded [`ExecutionPool`]. Per-request timings are gathered by the
//! [`TimingCollector`] and reduced into statistics, a bottleneck breakdown,
//! a one-second time series and optional assertion results.
//!
//! [`ChainExecutor`] runs dependent requests sequentially, carrying values
//! extracted from one response into the next request.

pub mod assertions;
pub mod chain;
pub mod collector;
pub mod context;
pub mod error;
pub mod jsonpath;
pub mod plan;
pub mod pool;
pub mod report;
pub mod run;
pub mod sample;
pub mod scheduler;
pub mod sink;
pub mod stats;
pub mod timeseries;

pub use assertions::{Assertion, AssertionKind, AssertionResult, Observed, Operator};
pub use chain::{
    ChainExecutor, ChainRequest, ChainResult, ChainStep, ExtractSource, ExtractionRule,
    StepResult, Variables,
};
pub use collector::{BatchResult, CollectedSamples, Sample, TimingCollector};
pub use context::RunContext;
pub use error::{EngineError, EngineResult};
pub use plan::{LoadPlan, Phase, PhaseDurations, PhaseWindow};
pub use pool::{Batch, BodyRetention, ExecutionPool};
pub use report::{LoadTestReport, RunResponse, RunSummary};
pub use run::{resolve, LoadPhaseConfig, LoadTestRequest, LoadTestRunner, ResolvedRun};
pub use sample::{ResponseOutcome, SampleTiming};
pub use scheduler::{PhaseBatch, PhasePlan, PhaseScheduler};
pub use sink::{JsonLinesSink, NullSink, ResultSink, RunRecord};
pub use stats::{Aggregate, AggregationError, BottleneckBreakdown, TestStatistics, TestingSummary};
pub use timeseries::TimeSeriesBucket;
