//! Timing collector
//!
//! Results arrive from the execution pool in completion order and are stored
//! by dispatch index, so the collected arrays are always in dispatch order.

use crate::sample::{ResponseOutcome, SampleTiming};
use tracing::warn;

/// One completed request as returned by the pool
#[derive(Debug, Clone)]
pub struct Sample {
    pub timing: SampleTiming,
    pub outcome: ResponseOutcome,
}

/// Samples of one pool call
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub samples: Vec<Sample>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Index-addressed store for the samples of a run
#[derive(Debug, Default)]
pub struct TimingCollector {
    slots: Vec<Option<Sample>>,
}

impl TimingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Store a sample in the slot of its dispatch index. A slot is written
    /// once; later writes to the same index are ignored.
    pub fn record(&mut self, sample: Sample) {
        let index = sample.timing.index;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        match &self.slots[index] {
            Some(_) => warn!("Duplicate sample for dispatch index {} ignored", index),
            None => self.slots[index] = Some(sample),
        }
    }

    pub fn absorb(&mut self, batch: BatchResult) {
        for sample in batch.samples {
            self.record(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the collector, yielding samples in dispatch order
    pub fn finish(self) -> CollectedSamples {
        let mut timings = Vec::with_capacity(self.slots.len());
        let mut outcomes = Vec::with_capacity(self.slots.len());
        for sample in self.slots.into_iter().flatten() {
            timings.push(sample.timing);
            outcomes.push(sample.outcome);
        }
        CollectedSamples { timings, outcomes }
    }
}

/// The full sample set of a run, in dispatch order
#[derive(Debug, Clone, Default)]
pub struct CollectedSamples {
    pub timings: Vec<SampleTiming>,
    pub outcomes: Vec<ResponseOutcome>,
}

impl CollectedSamples {
    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SampleTiming, &ResponseOutcome)> {
        self.timings.iter().zip(self.outcomes.iter())
    }
}
