//! Batch sizing against a run deadline
//!
//! Each batch is sized from the time left: `remaining / per_token_cost`,
//! capped at `hard_cap` so a distant deadline never produces an unbounded
//! batch.

use crate::config::CheckerConfig;
use chrono::Duration;

/// Default time budgeted per token
pub const DEFAULT_PER_TOKEN_COST_SECS: i64 = 10;

/// Default upper bound on a single batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBudget {
    per_token_cost: Duration,
    hard_cap: usize,
}

impl BatchBudget {
    /// A non-positive cost is treated as one millisecond
    pub fn new(per_token_cost: Duration, hard_cap: usize) -> Self {
        let per_token_cost = if per_token_cost <= Duration::zero() {
            Duration::milliseconds(1)
        } else {
            per_token_cost
        };

        Self {
            per_token_cost,
            hard_cap,
        }
    }

    pub fn from_config(config: &CheckerConfig) -> Self {
        Self::new(config.per_token_cost(), config.max_batch_size)
    }

    pub fn per_token_cost(&self) -> Duration {
        self.per_token_cost
    }

    pub fn hard_cap(&self) -> usize {
        self.hard_cap
    }

    /// Number of tokens that fit in `remaining`; zero once the deadline has passed
    pub fn batch_size(&self, remaining: Duration) -> usize {
        if remaining <= Duration::zero() {
            return 0;
        }

        let fits = remaining.num_milliseconds() / self.per_token_cost.num_milliseconds();
        usize::try_from(fits).unwrap_or(usize::MAX).min(self.hard_cap)
    }
}

impl Default for BatchBudget {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_PER_TOKEN_COST_SECS),
            DEFAULT_MAX_BATCH_SIZE,
        )
    }
}
