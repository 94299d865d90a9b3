use chrono::{DateTime, Utc};
use sfc_core::{RunStrategy, WorkerConfig};
use std::time::{Duration, Instant};

/// Per-invocation state of a queue run.
///
/// Passed explicitly to the runner and to every probe, so nothing needs a
/// process-wide "worker is running" flag.
#[derive(Debug, Clone)]
pub struct RunContext {
    started_at: DateTime<Utc>,
    started: Instant,
    deadline: Option<Instant>,
    strategy: RunStrategy,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(RunStrategy::Sequential)
    }
}

impl RunContext {
    pub fn new(strategy: RunStrategy) -> Self {
        Self { started_at: Utc::now(), started: Instant::now(), deadline: None, strategy }
    }

    /// Context for a run configured by `config` (strategy and deadline).
    pub fn from_config(config: &WorkerConfig) -> Self {
        let ctx = Self::new(config.strategy());
        match config.run_deadline() {
            Some(budget) => ctx.with_deadline(budget),
            None => ctx,
        }
    }

    /// Stop starting new entries once `budget` has elapsed from now.
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    pub fn strategy(&self) -> RunStrategy {
        self.strategy
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline; `None` when the run has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// `timeout` shortened to the time left, or `None` once expired.
    pub fn clamp_timeout(&self, timeout: Duration) -> Option<Duration> {
        match self.remaining() {
            None => Some(timeout),
            Some(left) if left.is_zero() => None,
            Some(left) => Some(timeout.min(left)),
        }
    }
}
