//! Phase scheduler
//!
//! Turns a [`LoadPlan`] into ordered per-second batches and feeds them to the
//! execution pool one at a time. Pacing between batches is best effort; the
//! schedule approximates wall-clock seconds rather than locking to them.

use crate::collector::TimingCollector;
use crate::context::RunContext;
use crate::error::EngineResult;
use crate::plan::{LoadPlan, Phase, PhaseWindow};
use crate::pool::{Batch, ExecutionPool};
use barrage_http::RequestSpec;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// One batch of the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBatch {
    pub phase: Phase,
    pub vus: u32,
    pub requests: u64,
    /// Planned second of the run this batch belongs to
    pub start_offset: u64,
    /// Sleep for the pacing delay after this batch
    pub pace_after: bool,
}

/// Ordered batches for one run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhasePlan {
    pub batches: Vec<PhaseBatch>,
}

impl PhasePlan {
    pub fn planned_requests(&self) -> u64 {
        self.batches.iter().map(|b| b.requests).sum()
    }

    pub fn windows(&self) -> Vec<PhaseWindow> {
        self.batches
            .iter()
            .map(|b| PhaseWindow {
                phase: b.phase,
                start_offset: b.start_offset,
                vus: b.vus,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// VUs at second `s` (1-based) of a ramp-up of `duration` seconds
pub fn ramp_up_vus(warmup_vus: u32, max_vus: u32, s: u32, duration: u32) -> u32 {
    if duration == 0 {
        return max_vus;
    }
    let span = max_vus.saturating_sub(warmup_vus) as f64;
    (warmup_vus as f64 + span * s as f64 / duration as f64).ceil() as u32
}

/// VUs at second `s` (1-based) of a ramp-down of `duration` seconds
pub fn ramp_down_vus(warmup_vus: u32, max_vus: u32, s: u32, duration: u32) -> u32 {
    if duration == 0 {
        return warmup_vus;
    }
    let span = max_vus.saturating_sub(warmup_vus) as f64;
    (max_vus as f64 - span * s as f64 / duration as f64).ceil() as u32
}

/// Requests sent in one second by `vus` users at `per_second` requests per second
pub fn batch_size(vus: u32, per_second: u64) -> u64 {
    let vus = vus.max(1) as u64;
    vus * per_second.div_ceil(vus).max(1)
}

/// Plans and drives the batches of a run
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    pacing: Duration,
}

impl PhaseScheduler {
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    pub fn plan(&self, plan: &LoadPlan) -> PhasePlan {
        let total_iterations = plan.total_iterations();

        if !plan.is_phased() {
            return PhasePlan {
                batches: vec![PhaseBatch {
                    phase: Phase::Sustain,
                    vus: plan.max_vus,
                    requests: total_iterations,
                    start_offset: 0,
                    pace_after: false,
                }],
            };
        }

        let durations = plan.durations;
        let per_second = total_iterations.div_ceil(durations.total()).max(1);
        let warmup_vus = plan.warmup_vus();
        let max_vus = plan.max_vus;

        let phases = [
            (Phase::Warmup, durations.warmup),
            (Phase::Rampup, durations.ramp_up),
            (Phase::Sustain, durations.sustain),
            (Phase::Rampdown, durations.ramp_down),
        ];

        let mut batches: Vec<PhaseBatch> = Vec::new();
        let mut remaining = total_iterations;
        let mut offset = 0u64;

        'phases: for (phase, seconds) in phases {
            for s in 1..=seconds {
                if remaining == 0 {
                    break 'phases;
                }

                let vus = match phase {
                    Phase::Warmup => warmup_vus,
                    Phase::Rampup => ramp_up_vus(warmup_vus, max_vus, s, seconds),
                    Phase::Sustain => max_vus,
                    Phase::Rampdown => ramp_down_vus(warmup_vus, max_vus, s, seconds),
                };
                let requests = batch_size(vus, per_second).min(remaining);
                remaining -= requests;

                batches.push(PhaseBatch {
                    phase,
                    vus,
                    requests,
                    start_offset: offset,
                    pace_after: false,
                });
                offset += 1;
            }
        }

        for i in 1..batches.len() {
            if batches[i].phase == batches[i - 1].phase {
                batches[i - 1].pace_after = true;
            }
        }

        PhasePlan { batches }
    }

    /// Run every batch through the pool, strictly one after another
    pub async fn execute(
        &self,
        plan: &PhasePlan,
        pool: &ExecutionPool,
        ctx: &mut RunContext,
        base: &RequestSpec,
    ) -> EngineResult<TimingCollector> {
        let mut collector = TimingCollector::with_capacity(plan.planned_requests() as usize);
        let mut current_phase: Option<Phase> = None;

        for batch in &plan.batches {
            if current_phase != Some(batch.phase) {
                info!("Entering {} phase at {} VUs", batch.phase, batch.vus);
                current_phase = Some(batch.phase);
            }

            let result = pool
                .run_batch(
                    ctx,
                    base,
                    &Batch::new(batch.requests as usize, batch.vus as usize, Some(batch.phase)),
                )
                .await?;
            debug!(
                "Batch at second {} done: {} requests, {:.3}s into run",
                batch.start_offset,
                result.len(),
                ctx.elapsed().as_secs_f64()
            );
            collector.absorb(result);

            if batch.pace_after {
                tokio::time::sleep(self.pacing).await;
            }
        }

        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PhaseDurations;

    fn scheduler() -> PhaseScheduler {
        PhaseScheduler::new(Duration::from_millis(100))
    }

    fn phased(max_vus: u32, iterations: u32, durations: PhaseDurations, percent: u32) -> LoadPlan {
        LoadPlan::new(max_vus, iterations).with_phases(durations, percent)
    }

    #[test]
    fn test_unphased_plan_is_one_sustain_batch() {
        let plan = scheduler().plan(&LoadPlan::new(5, 2));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.batches[0].phase, Phase::Sustain);
        assert_eq!(plan.batches[0].vus, 5);
        assert_eq!(plan.batches[0].requests, 10);
        assert!(!plan.batches[0].pace_after);
    }

    #[test]
    fn test_warmup_only_plan() {
        let durations = PhaseDurations {
            warmup: 2,
            ..PhaseDurations::default()
        };
        let plan = scheduler().plan(&phased(10, 1, durations, 20));

        assert_eq!(plan.len(), 2);
        assert!(plan.batches.iter().all(|b| b.phase == Phase::Warmup && b.vus == 2));
        assert_eq!(plan.batches[0].requests, 6);
        assert_eq!(plan.batches[1].requests, 4);
        assert!(plan.batches[0].pace_after);
        assert!(!plan.batches[1].pace_after);
        assert_eq!(plan.planned_requests(), 10);
    }

    #[test]
    fn test_cap_stops_schedule_mid_phase() {
        let durations = PhaseDurations {
            warmup: 1,
            sustain: 10,
            ..PhaseDurations::default()
        };
        // 4 requests over 11 seconds: one per second, but each batch sends at
        // least one per VU
        let plan = scheduler().plan(&phased(2, 2, durations, 50));

        assert_eq!(plan.planned_requests(), 4);
        assert_eq!(plan.batches[0].phase, Phase::Warmup);
        assert_eq!(plan.batches[0].requests, 1);
        assert_eq!(plan.batches[1].phase, Phase::Sustain);
        assert_eq!(plan.batches[1].requests, 2);
        assert_eq!(plan.batches[2].requests, 1);
        assert_eq!(plan.len(), 3);
        assert!(!plan.batches[2].pace_after);
    }

    #[test]
    fn test_no_pacing_across_phase_boundary() {
        let durations = PhaseDurations {
            warmup: 1,
            ramp_up: 2,
            sustain: 1,
            ramp_down: 2,
        };
        let plan = scheduler().plan(&phased(10, 100, durations, 20));
        let phases: Vec<_> = plan.batches.iter().map(|b| (b.phase, b.pace_after)).collect();

        assert_eq!(
            phases,
            vec![
                (Phase::Warmup, false),
                (Phase::Rampup, true),
                (Phase::Rampup, false),
                (Phase::Sustain, false),
                (Phase::Rampdown, true),
                (Phase::Rampdown, false),
            ]
        );
        let vus: Vec<_> = plan.batches.iter().map(|b| b.vus).collect();
        assert_eq!(vus, vec![2, 6, 10, 10, 6, 2]);
    }

    #[test]
    fn test_ramp_curves() {
        assert_eq!(ramp_up_vus(2, 10, 1, 4), 4);
        assert_eq!(ramp_up_vus(2, 10, 4, 4), 10);
        assert_eq!(ramp_up_vus(1, 10, 1, 3), 4);
        assert_eq!(ramp_down_vus(2, 10, 1, 4), 8);
        assert_eq!(ramp_down_vus(2, 10, 4, 4), 2);
    }

    #[test]
    fn test_batch_size_rounds_to_whole_vus() {
        assert_eq!(batch_size(2, 5), 6);
        assert_eq!(batch_size(10, 3), 10);
        assert_eq!(batch_size(4, 8), 8);
    }

    #[test]
    fn test_windows_follow_batches() {
        let durations = PhaseDurations {
            warmup: 1,
            sustain: 1,
            ..PhaseDurations::default()
        };
        let windows = scheduler().plan(&phased(4, 10, durations, 25)).windows();
        assert_eq!(
            windows,
            vec![
                PhaseWindow {
                    phase: Phase::Warmup,
                    start_offset: 0,
                    vus: 1
                },
                PhaseWindow {
                    phase: Phase::Sustain,
                    start_offset: 1,
                    vus: 4
                },
            ]
        );
    }
}
