//! Reconciliation engine
//!
//! Drives one run of the select → validate → write loop:
//! 1. Size the next batch from the time left before the deadline
//! 2. Select up to that many due tokens (most stale first)
//! 3. Validate each token and persist the outcome, one at a time
//! 4. Repeat until nothing is due, the deadline passes, or the run is cancelled
//!
//! Write failures are isolated: the outcome is logged and counted, the token
//! is skipped for the rest of the run, and the loop continues. Only a failed
//! selection ends a run with an error.

pub mod budget;
pub mod clock;

pub use budget::BatchBudget;
pub use clock::{Clock, ManualClock, SystemClock};

use crate::error::{RunError, WriteError};
use crate::metrics::CheckerMetrics;
use crate::models::{CheckOutcome, DueToken, TokenKey};
use crate::store::{StalenessPolicy, TokenStore};
use crate::validator::TokenValidator;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Why a run stopped without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// No due tokens left
    #[default]
    Exhausted,
    /// Not enough time left for another token
    DeadlineReached,
    /// Shutdown was requested
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "EXHAUSTED"),
            Self::DeadlineReached => write!(f, "DEADLINE_REACHED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Counts for one completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: u32,
    pub checked: u32,
    pub valid: u32,
    pub invalid: u32,
    pub names_changed: u32,
    pub write_failures: u32,
    pub stop_reason: StopReason,
}

/// Batch driver for token re-validation
pub struct TokenChecker<S, V, C = SystemClock> {
    store: S,
    validator: V,
    clock: C,
    policy: StalenessPolicy,
    budget: BatchBudget,
    metrics: Option<Arc<CheckerMetrics>>,
}

impl<S, V, C> TokenChecker<S, V, C>
where
    S: TokenStore,
    V: TokenValidator,
    C: Clock,
{
    /// Create a checker with the default staleness policy and budget
    pub fn new(store: S, validator: V, clock: C) -> Self {
        Self {
            store,
            validator,
            clock,
            policy: StalenessPolicy::default(),
            budget: BatchBudget::default(),
            metrics: None,
        }
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_budget(mut self, budget: BatchBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CheckerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn observe(&self, record: impl FnOnce(&CheckerMetrics)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }

    /// Run one reconciliation session bounded by `deadline`
    ///
    /// Cancellation and the deadline are only checked between batches; a
    /// batch that has started always runs to completion.
    pub async fn run(
        &self,
        deadline: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let started_at = self.clock.now();
        let mut summary = RunSummary::default();
        let mut failed_writes: HashSet<TokenKey> = HashSet::new();

        self.observe(|m| m.runs.inc());
        tracing::info!(
            started_at = %started_at,
            deadline = %deadline,
            "Starting token check run"
        );

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let now = self.clock.now();
            let batch_size = self.budget.batch_size(deadline - now);
            if batch_size == 0 {
                break StopReason::DeadlineReached;
            }

            // Over-fetch by the number of skipped tokens so they cannot crowd out the rest.
            let query = self
                .policy
                .query(now, started_at, batch_size + failed_writes.len());

            let selected = match self.store.select_due(&query).await {
                Ok(selected) => selected,
                Err(e) => {
                    self.observe(|m| m.run_failures.inc());
                    tracing::error!(error = %e, "Failed to load token batch");
                    return Err(RunError::Selection(e));
                }
            };

            let batch: Vec<DueToken> = selected
                .into_iter()
                .filter(|token| !failed_writes.contains(&token.key))
                .take(batch_size)
                .collect();

            if batch.is_empty() {
                break StopReason::Exhausted;
            }

            summary.batches += 1;
            self.observe(|m| m.batches.inc());
            tracing::info!(batch.size = batch.len(), "Checking batch");

            for token in &batch {
                let span = tracing::info_span!(
                    "check_token",
                    account.id = %token.key.account_id,
                    external_account.id = %token.key.external_account_id
                );

                match self.check_single(token).instrument(span).await {
                    Ok(outcome) => self.tally(&mut summary, token, &outcome),
                    Err(e) => {
                        summary.write_failures += 1;
                        self.observe(|m| m.write_failures.inc());
                        tracing::warn!(
                            account.id = %e.key.account_id,
                            external_account.id = %e.key.external_account_id,
                            error = %e,
                            "Token check outcome not recorded, skipping for this run"
                        );
                        failed_writes.insert(e.key);
                    }
                }
            }
        };

        summary.stop_reason = stop_reason;
        self.observe(|m| m.record_run_finished(self.clock.now()));

        tracing::info!(
            batches = summary.batches,
            checked = summary.checked,
            valid = summary.valid,
            invalid = summary.invalid,
            names_changed = summary.names_changed,
            write_failures = summary.write_failures,
            stop_reason = %summary.stop_reason,
            "Token check run finished"
        );

        Ok(summary)
    }

    /// Validate one token and persist the outcome
    async fn check_single(&self, token: &DueToken) -> Result<CheckOutcome, WriteError> {
        let outcome = match self.validator.validate(token).await {
            Ok(display_name) => CheckOutcome::Valid { display_name },
            Err(_) => CheckOutcome::Invalid,
        };

        let now = self.clock.now();
        self.store
            .record_outcome(&token.key, &outcome, now)
            .await
            .map_err(|source| WriteError {
                key: token.key,
                source,
            })?;

        Ok(outcome)
    }

    fn tally(&self, summary: &mut RunSummary, token: &DueToken, outcome: &CheckOutcome) {
        summary.checked += 1;
        self.observe(|m| m.tokens_checked.inc());

        match outcome {
            CheckOutcome::Valid { display_name } => {
                summary.valid += 1;
                self.observe(|m| m.tokens_valid.inc());
                if *display_name != token.display_name {
                    summary.names_changed += 1;
                    self.observe(|m| m.names_changed.inc());
                }
            }
            CheckOutcome::Invalid => {
                summary.invalid += 1;
                self.observe(|m| m.tokens_invalid.inc());
            }
        }
    }
}
