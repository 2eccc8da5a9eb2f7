//! Staleness selection
//!
//! A token is due when it is still inside the validity window and either its
//! validity check or its name refresh is older than the configured interval.
//! Due tokens are ordered by the earlier of the two check timestamps, so one
//! query serves both staleness concerns.

use crate::config::CheckerConfig;
use crate::db::{from_millis, to_millis, DbPool};
use crate::error::{StorageError, StorageResult};
use crate::models::{DueToken, TokenKey};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

const SELECT_DUE_SQL: &str = r#"
SELECT tk.account_id, tk.external_account_id, acc.display_name, tk.api_token,
       tk.last_valid_time, tk.last_valid_check_time, acc.last_name_check_time
FROM api_token_links tk
INNER JOIN linked_accounts acc
ON tk.account_id = acc.account_id AND tk.external_account_id = acc.external_account_id
WHERE tk.last_valid_time >= ?
AND (tk.last_valid_check_time <= ? OR acc.last_name_check_time <= ?)
AND tk.last_valid_check_time < ?
ORDER BY MIN(tk.last_valid_check_time, acc.last_name_check_time) ASC,
         tk.account_id ASC, tk.external_account_id ASC
LIMIT ?
"#;

/// Bounds for one selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionQuery {
    /// Tokens last confirmed valid before this are expired
    pub min_valid_time: DateTime<Utc>,
    /// Validity checks at or before this are stale
    pub max_valid_check_time: DateTime<Utc>,
    /// Name refreshes at or before this are stale
    pub max_name_check_time: DateTime<Utc>,
    /// Tokens checked at or after this instant are skipped (already handled in the current run)
    pub checked_before: DateTime<Utc>,
    /// Maximum number of rows
    pub limit: usize,
}

/// Staleness policy: validity window plus the two re-check intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub validity_timeout: Duration,
    pub valid_check_interval: Duration,
    pub name_check_interval: Duration,
}

impl StalenessPolicy {
    pub fn from_config(config: &CheckerConfig) -> Self {
        Self {
            validity_timeout: config.validity_timeout(),
            valid_check_interval: config.valid_check_interval(),
            name_check_interval: config.name_check_interval(),
        }
    }

    /// Build the selection bounds relative to `now`
    pub fn query(
        &self,
        now: DateTime<Utc>,
        checked_before: DateTime<Utc>,
        limit: usize,
    ) -> SelectionQuery {
        SelectionQuery {
            min_valid_time: earlier_by(now, self.validity_timeout),
            max_valid_check_time: earlier_by(now, self.valid_check_interval),
            max_name_check_time: earlier_by(now, self.name_check_interval),
            checked_before,
            limit,
        }
    }

    /// Whether the token is still inside the validity window
    pub fn is_eligible(&self, token: &DueToken, now: DateTime<Utc>) -> bool {
        token.last_valid_time >= earlier_by(now, self.validity_timeout)
    }

    /// Whether the token is eligible and at least one check is stale
    pub fn is_due(&self, token: &DueToken, now: DateTime<Utc>) -> bool {
        self.is_eligible(token, now)
            && (token.last_valid_check_time <= earlier_by(now, self.valid_check_interval)
                || token.last_name_check_time <= earlier_by(now, self.name_check_interval))
    }
}

/// `now - window`, saturating at the earliest representable instant
fn earlier_by(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_config(&CheckerConfig::default())
    }
}

#[derive(sqlx::FromRow)]
struct DueTokenRow {
    account_id: String,
    external_account_id: String,
    display_name: String,
    api_token: String,
    last_valid_time: i64,
    last_valid_check_time: i64,
    last_name_check_time: i64,
}

impl TryFrom<DueTokenRow> for DueToken {
    type Error = StorageError;

    fn try_from(row: DueTokenRow) -> Result<Self, Self::Error> {
        let row_key = format!("{}/{}", row.account_id, row.external_account_id);
        let invalid = |reason: String| StorageError::InvalidRow {
            key: row_key.clone(),
            reason,
        };

        let account_id = Uuid::parse_str(&row.account_id)
            .map_err(|e| invalid(format!("account_id: {}", e)))?;
        let external_account_id = Uuid::parse_str(&row.external_account_id)
            .map_err(|e| invalid(format!("external_account_id: {}", e)))?;
        let timestamp = |millis: i64, column: &str| {
            from_millis(millis).ok_or_else(|| invalid(format!("{} out of range: {}", column, millis)))
        };

        Ok(DueToken {
            key: TokenKey::new(account_id, external_account_id),
            api_token: row.api_token,
            display_name: row.display_name,
            last_valid_time: timestamp(row.last_valid_time, "last_valid_time")?,
            last_valid_check_time: timestamp(row.last_valid_check_time, "last_valid_check_time")?,
            last_name_check_time: timestamp(row.last_name_check_time, "last_name_check_time")?,
        })
    }
}

/// Select due tokens inside a read-only transaction (one consistent snapshot)
pub async fn select_due(pool: &DbPool, query: &SelectionQuery) -> StorageResult<Vec<DueToken>> {
    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

    let mut tx = pool.begin().await?;
    let rows = sqlx::query_as::<_, DueTokenRow>(SELECT_DUE_SQL)
        .bind(to_millis(query.min_valid_time))
        .bind(to_millis(query.max_valid_check_time))
        .bind(to_millis(query.max_name_check_time))
        .bind(to_millis(query.checked_before))
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;

    rows.into_iter().map(DueToken::try_from).collect()
}
