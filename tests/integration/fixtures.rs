//! Shared database fixtures for integration tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use token_checker::config::DatabaseConfig;
use token_checker::db::{self, from_millis, to_millis, Database};
use token_checker::models::{DueToken, TokenKey};
use uuid::Uuid;

/// Create a temporary database with the bundled schema applied
pub async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: temp_dir.path().join("test.db"),
        max_connections: 5,
        apply_schema: true,
    };

    let database = db::init_database(&config).await.unwrap();
    db::apply_schema(&database.writer).await.unwrap();

    (database, temp_dir)
}

/// Fixed reference instant (whole seconds, so it survives millisecond storage)
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

/// A token-link record plus its account record
#[derive(Debug, Clone)]
pub struct TokenFixture {
    pub key: TokenKey,
    pub api_token: String,
    pub display_name: String,
    pub last_valid_time: DateTime<Utc>,
    pub last_valid_check_time: DateTime<Utc>,
    pub last_name_check_time: DateTime<Utc>,
}

impl TokenFixture {
    /// Confirmed valid `valid_age` ago; both checks performed `check_age` ago
    pub fn new(api_token: &str, valid_age: Duration, check_age: Duration) -> Self {
        let now = fixed_now();
        Self {
            key: TokenKey::new(Uuid::new_v4(), Uuid::new_v4()),
            api_token: api_token.to_string(),
            display_name: "Legacy.1234".to_string(),
            last_valid_time: now - valid_age,
            last_valid_check_time: now - check_age,
            last_name_check_time: now - check_age,
        }
    }

    pub fn with_check_ages(mut self, valid_check_age: Duration, name_check_age: Duration) -> Self {
        let now = fixed_now();
        self.last_valid_check_time = now - valid_check_age;
        self.last_name_check_time = now - name_check_age;
        self
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    /// The record as the selector would return it
    pub fn due_token(&self) -> DueToken {
        DueToken {
            key: self.key,
            api_token: self.api_token.clone(),
            display_name: self.display_name.clone(),
            last_valid_time: self.last_valid_time,
            last_valid_check_time: self.last_valid_check_time,
            last_name_check_time: self.last_name_check_time,
        }
    }
}

pub async fn insert_token(database: &Database, fixture: &TokenFixture) {
    sqlx::query(
        "INSERT INTO api_token_links (account_id, external_account_id, api_token, last_valid_time, last_valid_check_time) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(fixture.key.account_id.to_string())
    .bind(fixture.key.external_account_id.to_string())
    .bind(&fixture.api_token)
    .bind(to_millis(fixture.last_valid_time))
    .bind(to_millis(fixture.last_valid_check_time))
    .execute(&database.writer)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO linked_accounts (account_id, external_account_id, display_name, last_name_check_time) VALUES (?, ?, ?, ?)",
    )
    .bind(fixture.key.account_id.to_string())
    .bind(fixture.key.external_account_id.to_string())
    .bind(&fixture.display_name)
    .bind(to_millis(fixture.last_name_check_time))
    .execute(&database.writer)
    .await
    .unwrap();
}

/// Persisted state of one token, read back through the writer pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub display_name: String,
    pub last_valid_time: DateTime<Utc>,
    pub last_valid_check_time: DateTime<Utc>,
    pub last_name_check_time: DateTime<Utc>,
}

pub async fn load_token(database: &Database, key: &TokenKey) -> StoredToken {
    let (display_name, last_valid_time, last_valid_check_time, last_name_check_time): (
        String,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        r#"
        SELECT acc.display_name, tk.last_valid_time, tk.last_valid_check_time, acc.last_name_check_time
        FROM api_token_links tk
        INNER JOIN linked_accounts acc
        ON tk.account_id = acc.account_id AND tk.external_account_id = acc.external_account_id
        WHERE tk.account_id = ? AND tk.external_account_id = ?
        "#,
    )
    .bind(key.account_id.to_string())
    .bind(key.external_account_id.to_string())
    .fetch_one(&database.writer)
    .await
    .unwrap();

    StoredToken {
        display_name,
        last_valid_time: from_millis(last_valid_time).unwrap(),
        last_valid_check_time: from_millis(last_valid_check_time).unwrap(),
        last_name_check_time: from_millis(last_name_check_time).unwrap(),
    }
}
