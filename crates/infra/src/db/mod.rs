//! SQLite persistence layer.
//!
//! The backing database is the single shared mutable resource: several OS
//! processes may open the same file, and every coordination guarantee comes from
//! SQLite transactions (WAL journal, busy timeout), never from an in-process lock.
//!
//! ## Error Mapping
//!
//! | SQLx Error | SQLite code | AssessmentError |
//! |------------|-------------|-----------------|
//! | Database (busy / locked) | `5`, `6`, `517` | `StorageUnavailable` |
//! | Database (other) | any | `StorageUnavailable` |
//! | PoolTimedOut / PoolClosed / Io | N/A | `StorageUnavailable` |
//! | ColumnDecode / Decode | N/A | `StorageUnavailable` |
//!
//! Optimistic-concurrency conflicts are *not* database errors here: they are
//! detected by a compare-and-set `UPDATE` matching zero rows (see `store`).

pub mod rows;
pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use assessor_core::{AssessmentError, AssessmentResult};

use crate::config::StoreConfig;

/// Open a connection pool and make sure the schema exists.
///
/// `sqlite::memory:` gives every pooled connection its own private database;
/// use a file URL whenever more than one connection is configured.
pub async fn connect(config: &StoreConfig) -> AssessmentResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| map_sqlx_error("parse_database_url", e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.busy_timeout.max(Duration::from_secs(1)))
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;

    schema::ensure_schema(&pool).await?;
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "assessment store connected"
    );
    Ok(pool)
}

/// Map SQLx errors to `AssessmentError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AssessmentError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            match code.as_str() {
                // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
                "5" | "6" | "517" => AssessmentError::storage(format!(
                    "database busy in {operation}: {}",
                    db_err.message()
                )),
                _ => AssessmentError::storage(format!(
                    "database error in {operation} (code {code}): {}",
                    db_err.message()
                )),
            }
        }
        sqlx::Error::PoolTimedOut => {
            AssessmentError::storage(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            AssessmentError::storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { index, source } => AssessmentError::storage(format!(
            "unreadable column {index} in {operation}: {source}"
        )),
        _ => AssessmentError::storage(format!("sqlx error in {operation}: {err}")),
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(column: &str, ms: i64) -> AssessmentResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AssessmentError::storage(format!("timestamp out of range in {column}: {ms}")))
}
