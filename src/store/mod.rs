//! Persistent store for token-link and account records
//!
//! The checker only needs two operations from storage:
//! - select the tokens due for a re-check (read-only snapshot)
//! - record the outcome of one check (one atomic two-table update)

pub mod selector;
pub mod writer;

pub use selector::{SelectionQuery, StalenessPolicy};

use crate::db::Database;
use crate::error::StorageResult;
use crate::models::{CheckOutcome, DueToken, TokenKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Storage collaborator used by the batch driver
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Up to `query.limit` due tokens, most stale first
    async fn select_due(&self, query: &SelectionQuery) -> StorageResult<Vec<DueToken>>;

    /// Persist one outcome; both records commit together or not at all
    async fn record_outcome(
        &self,
        key: &TokenKey,
        outcome: &CheckOutcome,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    async fn select_due(&self, query: &SelectionQuery) -> StorageResult<Vec<DueToken>> {
        (**self).select_due(query).await
    }

    async fn record_outcome(
        &self,
        key: &TokenKey,
        outcome: &CheckOutcome,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        (**self).record_outcome(key, outcome, now).await
    }
}

/// SQLite-backed token store
#[derive(Debug, Clone)]
pub struct SqliteTokenStore {
    db: Database,
}

impl SqliteTokenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn select_due(&self, query: &SelectionQuery) -> StorageResult<Vec<DueToken>> {
        selector::select_due(&self.db.reader, query).await
    }

    async fn record_outcome(
        &self,
        key: &TokenKey,
        outcome: &CheckOutcome,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        writer::record_outcome(&self.db.writer, key, outcome, now).await
    }
}
