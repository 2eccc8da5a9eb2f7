//! Configuration management for the token checker
//!
//! Loads configuration from YAML files and environment variables.
//! Environment variables override YAML values.

use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Longest accepted window, interval or timeout (100 years)
pub const MAX_DURATION_SECS: i64 = 100 * 365 * 24 * 3600;

fn bounded_seconds(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(-MAX_DURATION_SECS, MAX_DURATION_SECS))
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Account API configuration
    pub validator: ValidatorConfig,
    /// Staleness and batching policy
    #[serde(default)]
    pub checker: CheckerConfig,
    /// Invocation settings
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Metrics endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Maximum connections in each pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Apply database/schema.sql on startup (local development only)
    #[serde(default)]
    pub apply_schema: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/token_checker.db")
}

fn default_max_connections() -> u32 {
    5
}

/// Account API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Account-info endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Value of the `v` schema version parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "https://api.guildwars2.com/v2/account".to_string()
}

fn default_api_version() -> String {
    "2025-08-29T00:00:00.000Z".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Staleness and batching policy
#[derive(Debug, Clone, Deserialize)]
pub struct CheckerConfig {
    /// Tokens not confirmed valid within this window are never selected
    #[serde(default = "default_validity_timeout")]
    pub validity_timeout_secs: i64,
    /// Minimum age of the last validity check before a re-check
    #[serde(default = "default_check_interval")]
    pub valid_check_interval_secs: i64,
    /// Minimum age of the last name refresh before a re-check
    #[serde(default = "default_check_interval")]
    pub name_check_interval_secs: i64,
    /// Time budgeted per token when sizing a batch
    #[serde(default = "default_per_token_cost")]
    pub per_token_cost_secs: i64,
    /// Upper bound on a single batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_validity_timeout() -> i64 {
    7 * 24 * 3600 // 7 days
}

fn default_check_interval() -> i64 {
    24 * 3600 // 1 day
}

fn default_per_token_cost() -> i64 {
    10
}

fn default_max_batch_size() -> usize {
    100
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            validity_timeout_secs: default_validity_timeout(),
            valid_check_interval_secs: default_check_interval(),
            name_check_interval_secs: default_check_interval(),
            per_token_cost_secs: default_per_token_cost(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl CheckerConfig {
    pub fn validity_timeout(&self) -> Duration {
        bounded_seconds(self.validity_timeout_secs)
    }

    pub fn valid_check_interval(&self) -> Duration {
        bounded_seconds(self.valid_check_interval_secs)
    }

    pub fn name_check_interval(&self) -> Duration {
        bounded_seconds(self.name_check_interval_secs)
    }

    pub fn per_token_cost(&self) -> Duration {
        bounded_seconds(self.per_token_cost_secs)
    }
}

/// How the process invokes reconciliation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// A single run, then exit
    Once,
    /// A run every `interval_secs` until shutdown
    Scheduled,
}

/// Invocation settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_run_mode")]
    pub mode: RunMode,
    /// Ceiling on a single run's wall-clock time
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: i64,
    /// Interval between scheduled runs
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_run_mode() -> RunMode {
    RunMode::Once
}

fn default_run_timeout() -> i64 {
    15 * 60 // 15 minutes
}

fn default_interval() -> u64 {
    3600
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: default_run_mode(),
            run_timeout_secs: default_run_timeout(),
            interval_secs: default_interval(),
        }
    }
}

impl RunnerConfig {
    pub fn run_timeout(&self) -> Duration {
        bounded_seconds(self.run_timeout_secs)
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (TOKEN_CHECKER_*)
    /// 2. config/config.yaml (if exists)
    /// 3. config.yaml (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("database.path", "data/token_checker.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.apply_schema", false)?
            .set_default("validator.endpoint", default_endpoint())?
            .set_default("validator.api_version", default_api_version())?
            .set_default("validator.request_timeout_ms", default_request_timeout())?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // TOKEN_CHECKER_RUNNER__MODE=scheduled -> runner.mode = scheduled
            .add_source(
                Environment::with_prefix("TOKEN_CHECKER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validator.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "Validator endpoint must be set".to_string(),
            ));
        }

        if self.checker.per_token_cost_secs <= 0 {
            return Err(ConfigError::Message(
                "checker.per_token_cost_secs must be positive".to_string(),
            ));
        }

        if self.checker.max_batch_size == 0 {
            return Err(ConfigError::Message(
                "checker.max_batch_size must be at least 1".to_string(),
            ));
        }

        if self.checker.validity_timeout_secs <= 0
            || self.checker.valid_check_interval_secs <= 0
            || self.checker.name_check_interval_secs <= 0
        {
            return Err(ConfigError::Message(
                "Checker intervals must be positive".to_string(),
            ));
        }

        let durations = [
            ("checker.validity_timeout_secs", self.checker.validity_timeout_secs),
            ("checker.valid_check_interval_secs", self.checker.valid_check_interval_secs),
            ("checker.name_check_interval_secs", self.checker.name_check_interval_secs),
            ("checker.per_token_cost_secs", self.checker.per_token_cost_secs),
            ("runner.run_timeout_secs", self.runner.run_timeout_secs),
        ];
        for (name, secs) in durations {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Message(format!(
                    "{} must be at most {} seconds",
                    name, MAX_DURATION_SECS
                )));
            }
        }

        if self.runner.run_timeout_secs <= 0 {
            return Err(ConfigError::Message(
                "runner.run_timeout_secs must be positive".to_string(),
            ));
        }

        if self.runner.mode == RunMode::Scheduled && self.runner.interval_secs == 0 {
            return Err(ConfigError::Message(
                "runner.interval_secs must be positive in scheduled mode".to_string(),
            ));
        }

        Ok(())
    }
}
