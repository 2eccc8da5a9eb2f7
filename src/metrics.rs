//! Prometheus metrics for the token checker
//!
//! Exposes run and per-token counters on `/metrics`, plus a `/health` probe
//! for the long-running scheduled mode.

use crate::config::MetricsConfig;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Metrics state
pub struct CheckerMetrics {
    /// Prometheus registry
    registry: Registry,
    /// Runs started
    pub runs: IntCounter,
    /// Runs that ended with a fatal error
    pub run_failures: IntCounter,
    /// Batches selected
    pub batches: IntCounter,
    /// Tokens validated
    pub tokens_checked: IntCounter,
    /// Tokens the account API accepted
    pub tokens_valid: IntCounter,
    /// Tokens the account API rejected or could not be reached for
    pub tokens_invalid: IntCounter,
    /// Valid tokens whose display name changed
    pub names_changed: IntCounter,
    /// Outcomes that could not be persisted
    pub write_failures: IntCounter,
    /// Completion time of the last run (Unix timestamp)
    pub last_run_timestamp: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl CheckerMetrics {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let last_run_timestamp = IntGauge::with_opts(Opts::new(
            "token_checker_last_run_timestamp",
            "Completion time of the last reconciliation run (Unix seconds)",
        ))?;
        registry.register(Box::new(last_run_timestamp.clone()))?;

        Ok(Self {
            runs: counter(&registry, "token_checker_runs_total", "Reconciliation runs started")?,
            run_failures: counter(
                &registry,
                "token_checker_run_failures_total",
                "Reconciliation runs that ended with a fatal error",
            )?,
            batches: counter(&registry, "token_checker_batches_total", "Token batches selected")?,
            tokens_checked: counter(
                &registry,
                "token_checker_tokens_checked_total",
                "Tokens validated against the account API",
            )?,
            tokens_valid: counter(
                &registry,
                "token_checker_tokens_valid_total",
                "Tokens confirmed valid",
            )?,
            tokens_invalid: counter(
                &registry,
                "token_checker_tokens_invalid_total",
                "Tokens that failed validation",
            )?,
            names_changed: counter(
                &registry,
                "token_checker_names_changed_total",
                "Display names updated by a check",
            )?,
            write_failures: counter(
                &registry,
                "token_checker_write_failures_total",
                "Check outcomes that could not be persisted",
            )?,
            last_run_timestamp,
            registry,
        })
    }

    /// Mark the completion time of a run
    pub fn record_run_finished(&self, finished_at: DateTime<Utc>) {
        self.last_run_timestamp.set(finished_at.timestamp());
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

async fn metrics_handler(State(metrics): State<Arc<CheckerMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Router serving `/metrics` and `/health`
pub fn router(metrics: Arc<CheckerMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serve the metrics router until `cancel` fires
pub async fn serve(
    config: &MetricsConfig,
    metrics: Arc<CheckerMetrics>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Metrics endpoint listening");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
