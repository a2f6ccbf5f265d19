// src/store/log_store.rs

//! Batched inserts into the `logs` table.

use crate::core::MillraceError;
use crate::db::{self, is_transient};
use crate::logging::LogRecord;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// The operation set the log daemon needs from its sink.
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a batch in one multi-row insert. Records keep production
    /// order within the batch.
    pub async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), MillraceError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO logs (level, message, fields, created_at) ");
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.level as i64)
                .push_bind(record.message.clone())
                .push_bind(record.fields.clone())
                .push_bind(db::encode_ts(record.created_at));
        });

        // One local retry on transient pool contention, then surface.
        let query = builder.build();
        match query.execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(first) if is_transient(&first) => {
                let mut retry: QueryBuilder<Sqlite> =
                    QueryBuilder::new("INSERT INTO logs (level, message, fields, created_at) ");
                retry.push_values(records, |mut row, record| {
                    row.push_bind(record.level as i64)
                        .push_bind(record.message.clone())
                        .push_bind(record.fields.clone())
                        .push_bind(db::encode_ts(record.created_at));
                });
                retry.build().execute(&self.pool).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cheap liveness probe; server initialization fails fast when the sink
    /// cannot answer it.
    pub async fn ping(&self) -> Result<(), MillraceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
