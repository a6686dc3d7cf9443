//! Per-invocation run state

use chrono::{DateTime, Utc};
use std::ops::Range;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// State owned by a single run: its identity, clock and dispatch counter.
///
/// A fresh context is created for every load run or chain, so nothing
/// carries over between invocations that share a runner.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
    next_index: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            started_at: Utc::now(),
            next_index: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Claim the next `count` dispatch indices
    pub fn reserve(&mut self, count: usize) -> Range<usize> {
        let start = self.next_index;
        self.next_index += count;
        start..self.next_index
    }

    /// Number of requests dispatched so far
    pub fn dispatched(&self) -> usize {
        self.next_index
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Token appended to a URL to defeat caches: timestamp, random part and the
/// dispatch index
pub fn cache_token(index: usize) -> String {
    format!(
        "{:x}{:08x}{}",
        Utc::now().timestamp_millis(),
        fastrand::u32(..),
        index
    )
}
