//! Database module for the token checker
//!
//! Manages the SQLite connection pools (WAL mode). Writes go through a
//! read-write pool; batch selection goes through a pool whose connections
//! are opened read-only, so a selection can never mutate state.

use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Type alias for the SQLite connection pool
pub type DbPool = Pool<Sqlite>;

/// Schema for the token and account tables
const SCHEMA: &str = include_str!("../database/schema.sql");

/// Read-write and read-only handles onto the same database file
#[derive(Debug, Clone)]
pub struct Database {
    pub writer: DbPool,
    pub reader: DbPool,
}

/// Initialize both connection pools
///
/// The read-write pool is opened first so the file exists (and is switched
/// to WAL) before the read-only pool connects.
pub async fn init_database(config: &DatabaseConfig) -> StorageResult<Database> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Database(sqlx::Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create database directory: {}", e),
                )))
            })?;
            info!("Created database directory: {:?}", parent);
        }
    }

    let db_url = format!("sqlite:{}", config.path.display());

    let write_options = SqliteConnectOptions::from_str(&db_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let writer = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(write_options)
        .await?;

    let read_options = SqliteConnectOptions::from_str(&db_url)?
        .busy_timeout(Duration::from_secs(5))
        .read_only(true);

    let reader = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(read_options)
        .await?;

    info!(
        "Database pools initialized: {:?} (max {} connections each)",
        config.path, config.max_connections
    );

    Ok(Database { writer, reader })
}

/// Apply the bundled schema. Every statement is idempotent.
pub async fn apply_schema(pool: &DbPool) -> StorageResult<()> {
    for stmt in schema_statements(SCHEMA) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Schema(format!("{}: {}", e, stmt)))?;
    }

    info!("Database schema applied");
    Ok(())
}

/// Split a script into statements. Comments are removed first, so a `;`
/// inside a comment never splits a statement.
fn schema_statements(script: &str) -> Vec<String> {
    strip_comments(script)
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_comments(script: &str) -> String {
    script
        .lines()
        .map(|line| match line.find("--") {
            Some(start) => &line[..start],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert an instant into the stored representation (epoch milliseconds)
pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Convert a stored timestamp back into an instant
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
