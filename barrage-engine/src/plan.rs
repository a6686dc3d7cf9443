//! Load plan and phase types

use crate::error::{EngineError, EngineResult};
use barrage_config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a phased load run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Warmup,
    Rampup,
    Sustain,
    Rampdown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::Rampup => "rampup",
            Phase::Sustain => "sustain",
            Phase::Rampdown => "rampdown",
        }
    }

    /// Share of the configured VUs assumed active while this phase dominates
    pub fn activity_factor(&self) -> f64 {
        match self {
            Phase::Warmup | Phase::Rampdown => 0.3,
            Phase::Rampup => 0.7,
            Phase::Sustain => 1.0,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-second phase durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDurations {
    pub warmup: u32,
    pub ramp_up: u32,
    pub sustain: u32,
    pub ramp_down: u32,
}

impl PhaseDurations {
    pub fn total(&self) -> u64 {
        self.warmup as u64 + self.ramp_up as u64 + self.sustain as u64 + self.ramp_down as u64
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// What to run: virtual users, iterations and the optional phase curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPlan {
    pub max_vus: u32,
    pub iterations_per_vu: u32,
    pub durations: PhaseDurations,
    pub warmup_vus_percent: u32,
}

impl LoadPlan {
    pub const DEFAULT_WARMUP_PERCENT: u32 = 20;
    pub const MIN_WARMUP_PERCENT: u32 = 5;
    pub const MAX_WARMUP_PERCENT: u32 = 100;

    /// An unphased plan
    pub fn new(max_vus: u32, iterations_per_vu: u32) -> Self {
        Self {
            max_vus,
            iterations_per_vu,
            durations: PhaseDurations::default(),
            warmup_vus_percent: Self::DEFAULT_WARMUP_PERCENT,
        }
    }

    pub fn with_phases(mut self, durations: PhaseDurations, warmup_vus_percent: u32) -> Self {
        self.durations = durations;
        self.warmup_vus_percent = warmup_vus_percent;
        self
    }

    pub fn total_iterations(&self) -> u64 {
        self.max_vus as u64 * self.iterations_per_vu as u64
    }

    pub fn is_phased(&self) -> bool {
        !self.durations.is_empty()
    }

    /// VUs used during warmup, and the floor of the ramp curves
    pub fn warmup_vus(&self) -> u32 {
        let scaled = (self.max_vus as f64 * self.warmup_vus_percent as f64 / 100.0).ceil() as u32;
        scaled.clamp(1, self.max_vus.max(1))
    }

    /// Check the plan against the engine limits
    pub fn validate(&self, limits: &EngineConfig) -> EngineResult<()> {
        if self.max_vus < 1 || self.max_vus > limits.max_concurrency {
            return Err(EngineError::validation(format!(
                "concurrency must be between 1 and {}, got {}",
                limits.max_concurrency, self.max_vus
            )));
        }

        if self.iterations_per_vu < 1 || self.iterations_per_vu > limits.max_iterations {
            return Err(EngineError::validation(format!(
                "iterations must be between 1 and {}, got {}",
                limits.max_iterations, self.iterations_per_vu
            )));
        }

        if self.total_iterations() > limits.max_total_requests {
            return Err(EngineError::validation(format!(
                "concurrency x iterations must not exceed {} requests, got {}",
                limits.max_total_requests,
                self.total_iterations()
            )));
        }

        if !(Self::MIN_WARMUP_PERCENT..=Self::MAX_WARMUP_PERCENT).contains(&self.warmup_vus_percent)
        {
            return Err(EngineError::validation(format!(
                "warmupVUsPercent must be between {} and {}, got {}",
                Self::MIN_WARMUP_PERCENT,
                Self::MAX_WARMUP_PERCENT,
                self.warmup_vus_percent
            )));
        }

        Ok(())
    }
}

/// One scheduled window of a phased run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseWindow {
    pub phase: Phase,
    /// Planned seconds from run start
    pub start_offset: u64,
    pub vus: u32,
}
