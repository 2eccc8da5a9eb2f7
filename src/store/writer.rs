//! Reconciliation writes
//!
//! Persists one check outcome across the token-link and account records in a
//! single transaction.
//!
//! - valid: `last_valid_check_time = last_valid_time = now`, name and
//!   `last_name_check_time = now` on the account
//! - invalid: `last_valid_check_time = now` only; `last_valid_time` keeps
//!   ageing until the token leaves the validity window

use crate::db::{to_millis, DbPool};
use crate::error::StorageResult;
use crate::models::{CheckOutcome, TokenKey};
use chrono::{DateTime, Utc};
use tracing::warn;

const MARK_VALID_SQL: &str = r#"
UPDATE api_token_links
SET last_valid_check_time = ?, last_valid_time = ?
WHERE account_id = ? AND external_account_id = ?
"#;

const REFRESH_NAME_SQL: &str = r#"
UPDATE linked_accounts
SET display_name = ?, last_name_check_time = ?
WHERE account_id = ? AND external_account_id = ?
"#;

const MARK_CHECKED_SQL: &str = r#"
UPDATE api_token_links
SET last_valid_check_time = ?
WHERE account_id = ? AND external_account_id = ?
"#;

/// Record the outcome of one check
///
/// Rows that vanished between selection and write are not an error: the
/// record was removed by its owner and there is nothing left to reconcile.
pub async fn record_outcome(
    pool: &DbPool,
    key: &TokenKey,
    outcome: &CheckOutcome,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let now_millis = to_millis(now);
    let account_id = key.account_id.to_string();
    let external_account_id = key.external_account_id.to_string();

    let mut tx = pool.begin().await?;

    let tokens_updated = match outcome {
        CheckOutcome::Valid { display_name } => {
            let tokens = sqlx::query(MARK_VALID_SQL)
                .bind(now_millis)
                .bind(now_millis)
                .bind(account_id.as_str())
                .bind(external_account_id.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();

            sqlx::query(REFRESH_NAME_SQL)
                .bind(display_name.as_str())
                .bind(now_millis)
                .bind(account_id.as_str())
                .bind(external_account_id.as_str())
                .execute(&mut *tx)
                .await?;

            tokens
        }
        CheckOutcome::Invalid => sqlx::query(MARK_CHECKED_SQL)
            .bind(now_millis)
            .bind(account_id.as_str())
            .bind(external_account_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected(),
    };

    tx.commit().await?;

    if tokens_updated == 0 {
        warn!(
            account.id = %key.account_id,
            external_account.id = %key.external_account_id,
            "Token record no longer exists, outcome discarded"
        );
    }

    Ok(())
}
