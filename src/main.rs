//! Token Checker
//!
//! Re-validates linked API tokens against the account API and refreshes
//! cached display names. Runs once against a timeout or on a fixed interval,
//! depending on `runner.mode`.

use std::sync::Arc;
use token_checker::{
    config::{AppConfig, RunMode},
    metrics::{self, CheckerMetrics},
    runner,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting token checker"
    );

    let config = load_config()?;

    let metrics = Arc::new(
        CheckerMetrics::new().map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?,
    );
    let checker = runner::build_checker(&config, metrics.clone()).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(runner::shutdown_signal(cancel.clone()));

    if config.metrics.enabled {
        let metrics_config = config.metrics.clone();
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(&metrics_config, metrics, cancel).await {
                tracing::error!(error = %e, "Metrics endpoint failed");
            }
        });
    }

    let result = match config.runner.mode {
        RunMode::Once => runner::run_once(&checker, config.runner.run_timeout(), &cancel)
            .await
            .map(|summary| {
                tracing::info!(
                    checked = summary.checked,
                    stop_reason = %summary.stop_reason,
                    "Token check complete"
                );
            })
            .map_err(anyhow::Error::from),
        RunMode::Scheduled => {
            runner::run_scheduled(&checker, &config.runner, cancel.clone()).await;
            Ok(())
        }
    };

    // Stops the metrics endpoint and the signal listener
    cancel.cancel();

    if let Err(e) = &result {
        tracing::error!(error = %e, "Token check failed");
    }
    tracing::info!("Token checker shutdown complete");
    result
}

/// Initialize tracing with JSON output
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "token_checker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
