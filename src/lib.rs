//! Token Checker Library
//!
//! Periodically re-validates API tokens linked to user accounts against the
//! external account API, refreshing each account's cached display name.
//! This library exposes core modules for the binary and for testing.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod store;
pub mod validator;

// Re-export commonly used types
pub use config::{AppConfig, CheckerConfig, RunMode};
pub use db::{Database, DbPool};
pub use engine::{BatchBudget, Clock, ManualClock, RunSummary, StopReason, SystemClock, TokenChecker};
pub use error::{AppError, AppResult, RunError, StorageError, WriteError};
pub use metrics::CheckerMetrics;
pub use models::{CheckOutcome, DueToken, TokenKey};
pub use store::{SelectionQuery, SqliteTokenStore, StalenessPolicy, TokenStore};
pub use validator::{AccountApiClient, LoggingValidator, TokenValidator, ValidationFailure};
