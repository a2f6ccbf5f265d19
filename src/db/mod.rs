// src/db/mod.rs

//! Connection pool construction and schema bootstrap for the embedded store.

pub mod schema;

use crate::core::MillraceError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Knobs that must exist before any configuration can be read, since the
/// configuration itself lives in this store.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub path: String,
    pub busy_timeout: Duration,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            path: "millrace.db".to_string(),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// Opens the store with write-ahead logging and a pool sized to the number of
/// hardware threads, then applies the embedded schema.
pub async fn connect(options: &DbOptions) -> Result<SqlitePool, MillraceError> {
    let connect_options = SqliteConnectOptions::new()
        .filename(Path::new(&options.path))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(options.busy_timeout)
        .foreign_keys(true);

    let max_connections = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options)
        .await?;

    pool.execute(sqlx::raw_sql(schema::SCHEMA)).await?;
    info!(
        "Store opened at '{}' (WAL, {} connections).",
        options.path, max_connections
    );
    Ok(pool)
}

/// Canonical timestamp encoding: RFC-3339 UTC with fixed-width microseconds,
/// which keeps lexicographic and chronological order identical.
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>, MillraceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MillraceError::Internal(format!("malformed timestamp '{raw}': {e}")))
}

/// Pool contention and lock timeouts are worth one local retry before the
/// error is surfaced.
pub fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    #[test]
    fn test_timestamp_round_trip_preserves_order() {
        let a = Utc::now();
        let b = a + chrono::Duration::microseconds(1);
        let (ea, eb) = (encode_ts(a), encode_ts(b));
        assert!(ea < eb);
        assert_eq!(decode_ts(&ea).unwrap(), a.trunc_subsecs(6));
    }
}
