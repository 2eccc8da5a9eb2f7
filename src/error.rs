//! Error types for the token checker

use crate::models::TokenKey;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reconciliation run failed
    #[error("Run failed: {0}")]
    Run(#[from] RunError),

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised by the persistent store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Query, transaction or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row could not be mapped into the domain model
    #[error("Invalid row for {key}: {reason}")]
    InvalidRow { key: String, reason: String },

    /// Schema file could not be applied
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Errors that terminate a reconciliation run
#[derive(Error, Debug)]
pub enum RunError {
    /// Selecting the next batch failed; nothing selected can be trusted
    #[error("Failed to load token batch: {0}")]
    Selection(#[source] StorageError),
}

/// A per-token write that did not commit. Never fatal to the run.
#[derive(Error, Debug)]
#[error("Failed to record outcome for {key}: {source}")]
pub struct WriteError {
    pub key: TokenKey,
    #[source]
    pub source: StorageError,
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
