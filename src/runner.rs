//! Invocation harness
//!
//! Two ways to drive the checker:
//! - [`run_once`]: one run bounded by a timeout (cron job, container task)
//! - [`run_scheduled`]: a long-running loop that starts a run on every tick
//!
//! Both honour a shared [`CancellationToken`] fired on SIGINT/SIGTERM.

use crate::config::{AppConfig, RunnerConfig};
use crate::db;
use crate::engine::{BatchBudget, Clock, RunSummary, SystemClock, TokenChecker};
use crate::error::{AppResult, RunError};
use crate::metrics::CheckerMetrics;
use crate::store::{SqliteTokenStore, StalenessPolicy, TokenStore};
use crate::validator::{AccountApiClient, LoggingValidator, TokenValidator};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// The production checker: SQLite store, logged account API client, wall clock
pub type ProductionChecker =
    TokenChecker<SqliteTokenStore, LoggingValidator<AccountApiClient>, SystemClock>;

/// Wire a checker from configuration
///
/// Opens both database pools and applies the bundled schema when
/// `database.apply_schema` is set.
pub async fn build_checker(
    config: &AppConfig,
    metrics: Arc<CheckerMetrics>,
) -> AppResult<ProductionChecker> {
    let database = db::init_database(&config.database).await?;
    if config.database.apply_schema {
        db::apply_schema(&database.writer).await?;
    }

    let client = AccountApiClient::new(&config.validator)?;

    Ok(TokenChecker::new(
        SqliteTokenStore::new(database),
        LoggingValidator::new(client),
        SystemClock,
    )
    .with_policy(StalenessPolicy::from_config(&config.checker))
    .with_budget(BatchBudget::from_config(&config.checker))
    .with_metrics(metrics))
}

/// Run once with a deadline of `timeout` from now
///
/// A timeout reaching past the calendar leaves the run bounded only by work.
pub async fn run_once<S, V, C>(
    checker: &TokenChecker<S, V, C>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<RunSummary, RunError>
where
    S: TokenStore,
    V: TokenValidator,
    C: Clock,
{
    let deadline = checker
        .clock()
        .now()
        .checked_add_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    checker.run(deadline, cancel).await
}

/// Start a run every `config.interval_secs` until cancelled
///
/// A failed run is logged and the next tick proceeds. Ticks missed while a
/// run is in progress are skipped, so runs from this process never overlap.
pub async fn run_scheduled<S, V, C>(
    checker: &TokenChecker<S, V, C>,
    config: &RunnerConfig,
    cancel: CancellationToken,
) where
    S: TokenStore,
    V: TokenValidator,
    C: Clock,
{
    tracing::info!(
        interval_secs = config.interval_secs,
        run_timeout_secs = config.run_timeout_secs,
        "Starting scheduled token checks"
    );

    let mut ticker = interval(std::time::Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scheduled token checks stopping");
                break;
            }
            _ = ticker.tick() => {
                match run_once(checker, config.run_timeout(), &cancel).await {
                    Ok(summary) => {
                        tracing::debug!(
                            checked = summary.checked,
                            stop_reason = %summary.stop_reason,
                            "Scheduled run completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Scheduled run failed");
                    }
                }
            }
        }
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    tracing::info!("Shutdown requested, finishing current batch");
    cancel.cancel();
}
