// src/queue/store.rs

//! Claim-based queue operations over the `job_queue` table.
//!
//! The uniqueness invariant (at most one row per `(job_type, payload,
//! cooldown_bucket)` in `pending` or `processing`) is enforced by a partial
//! unique index, so concurrent producers race safely at the store.

use crate::core::MillraceError;
use crate::db::{self, is_transient};
use crate::queue::backoff::BackoffPolicy;
use crate::queue::job::{Job, JobStatus, NewJob, cooldown_bucket};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a `pending` row. A conflicting insert within the same cooldown
    /// bucket surfaces as [`MillraceError::AlreadyQueued`] and never
    /// overwrites the existing row. Returns the new job id.
    pub async fn enqueue(&self, new: NewJob) -> Result<i64, MillraceError> {
        if new.job_type.trim().is_empty() {
            return Err(MillraceError::InvalidRequest(
                "job_type cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        let scheduled_for = new.scheduled_for.unwrap_or(now);
        let bucket = cooldown_bucket(now, new.cooldown);

        let result = sqlx::query(
            "INSERT INTO job_queue
               (job_type, payload, payload_extra, cooldown_bucket, status, attempts,
                max_attempts, created_at, updated_at, scheduled_for, recurrent, interval_secs)
             VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.job_type)
        .bind(&new.payload)
        .bind(&new.payload_extra)
        .bind(bucket)
        .bind(new.max_attempts as i64)
        .bind(db::encode_ts(now))
        .bind(db::encode_ts(now))
        .bind(db::encode_ts(scheduled_for))
        .bind(new.recurrent as i64)
        .bind(new.interval.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Claims up to `n` due rows in one transaction: the oldest `pending`
    /// rows whose `scheduled_for` has passed flip to `processing` and come
    /// back with their full payloads.
    pub async fn claim(&self, n: u32) -> Result<Vec<Job>, MillraceError> {
        match self.claim_once(n).await {
            Err(MillraceError::Db(e)) if is_transient(&e) => self.claim_once(n).await,
            other => other,
        }
    }

    async fn claim_once(&self, n: u32) -> Result<Vec<Job>, MillraceError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let ids: Vec<i64> = sqlx::query(
            "SELECT id FROM job_queue
             WHERE status = 'pending' AND scheduled_for <= ?
             ORDER BY scheduled_for ASC, id ASC
             LIMIT ?",
        )
        .bind(db::encode_ts(now))
        .bind(n as i64)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.get("id"))
        .collect();

        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let mut update: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE job_queue SET status = 'processing', locked_at = ");
        update.push_bind(db::encode_ts(now));
        update.push(", updated_at = ");
        update.push_bind(db::encode_ts(now));
        update.push(" WHERE status = 'pending' AND id IN (");
        let mut separated = update.separated(", ");
        for id in &ids {
            separated.push_bind(id);
        }
        update.push(")");
        update.build().execute(&mut *tx).await?;

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM job_queue WHERE id IN (");
        let mut separated = select.separated(", ");
        for id in &ids {
            separated.push_bind(id);
        }
        select.push(") ORDER BY scheduled_for ASC, id ASC");
        let rows = select.build().fetch_all(&mut *tx).await?;

        tx.commit().await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Marks a job `completed`. A second call for the same id is a no-op.
    /// Recurrence is a post-completion re-enqueue, so a failing instance
    /// never delays the next periodic one.
    pub async fn complete(&self, id: i64) -> Result<(), MillraceError> {
        let job = self.get(id).await?;
        let now = Utc::now();

        let updated = sqlx::query(
            "UPDATE job_queue SET status = 'completed', completed_at = ?, updated_at = ?
             WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(db::encode_ts(now))
        .bind(db::encode_ts(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(());
        }

        if job.recurrent && !job.interval.is_zero() {
            let next = NewJob {
                job_type: job.job_type.clone(),
                payload: job.payload.clone(),
                payload_extra: job.payload_extra.clone(),
                max_attempts: job.max_attempts,
                scheduled_for: Some(now + chrono::Duration::from_std(job.interval).unwrap_or_default()),
                cooldown: job.interval,
                recurrent: true,
                interval: job.interval,
            };
            match self.enqueue(next).await {
                Ok(_) | Err(MillraceError::AlreadyQueued) => {
                    // Another instance already scheduled the next run.
                }
                Err(e) => return Err(e),
            }
            debug!(id, job_type = %job.job_type, "Re-enqueued recurrent job.");
        }
        Ok(())
    }

    /// Records a retryable failure: attempts increment, and the row goes back
    /// to `pending` at `now + backoff(attempts)` unless attempts are
    /// exhausted, in which case it becomes `failed`.
    pub async fn fail(
        &self,
        id: i64,
        error: &str,
        policy: &BackoffPolicy,
    ) -> Result<(), MillraceError> {
        let job = self.get(id).await?;
        let attempts = job.attempts + 1;
        let now = Utc::now();

        if attempts < job.max_attempts {
            let delay = policy.delay(attempts);
            let next = now + chrono::Duration::from_std(delay).unwrap_or_default();
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', attempts = ?, scheduled_for = ?, last_error = ?,
                     locked_at = NULL, updated_at = ?
                 WHERE id = ?",
            )
            .bind(attempts as i64)
            .bind(db::encode_ts(next))
            .bind(error)
            .bind(db::encode_ts(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed', attempts = ?, last_error = ?,
                     locked_at = NULL, updated_at = ?
                 WHERE id = ?",
            )
            .bind(attempts as i64)
            .bind(error)
            .bind(db::encode_ts(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Marks a job `failed` regardless of remaining attempts. Used for
    /// handler-declared permanent errors.
    pub async fn fail_permanent(&self, id: i64, error: &str) -> Result<(), MillraceError> {
        let job = self.get(id).await?;
        let now = Utc::now();
        sqlx::query(
            "UPDATE job_queue
             SET status = 'failed', attempts = ?, last_error = ?,
                 locked_at = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind((job.attempts + 1).min(job.max_attempts) as i64)
        .bind(error)
        .bind(db::encode_ts(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Routes every `processing` row locked before `now - visibility_timeout`
    /// through the standard failure path. Returns how many were reclaimed.
    pub async fn reap_stuck(
        &self,
        visibility_timeout: Duration,
        policy: &BackoffPolicy,
    ) -> Result<u64, MillraceError> {
        let cutoff =
            Utc::now() - chrono::Duration::from_std(visibility_timeout).unwrap_or_default();
        let ids: Vec<i64> = sqlx::query(
            "SELECT id FROM job_queue
             WHERE status = 'processing' AND locked_at IS NOT NULL AND locked_at <= ?",
        )
        .bind(db::encode_ts(cutoff))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| row.get("id"))
        .collect();

        for id in &ids {
            self.fail(*id, "reclaimed after visibility timeout", policy)
                .await?;
        }
        Ok(ids.len() as u64)
    }

    pub async fn get(&self, id: i64) -> Result<Job, MillraceError> {
        let row = sqlx::query("SELECT * FROM job_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(MillraceError::JobNotFound(id))?;
        row_to_job(&row)
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Job, MillraceError> {
    let status_raw: String = row.get("status");
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| MillraceError::Internal(format!("unknown job status '{status_raw}'")))?;

    let opt_ts = |column: &str| -> Result<Option<DateTime<Utc>>, MillraceError> {
        row.get::<Option<String>, _>(column)
            .map(|raw| db::decode_ts(&raw))
            .transpose()
    };

    Ok(Job {
        id: row.get("id"),
        job_type: row.get("job_type"),
        payload: row.get("payload"),
        payload_extra: row.get("payload_extra"),
        cooldown_bucket: row.get("cooldown_bucket"),
        status,
        attempts: row.get::<i64, _>("attempts") as u32,
        max_attempts: row.get::<i64, _>("max_attempts") as u32,
        created_at: db::decode_ts(row.get::<String, _>("created_at").as_str())?,
        updated_at: db::decode_ts(row.get::<String, _>("updated_at").as_str())?,
        scheduled_for: db::decode_ts(row.get::<String, _>("scheduled_for").as_str())?,
        locked_at: opt_ts("locked_at")?,
        completed_at: opt_ts("completed_at")?,
        last_error: row.get("last_error"),
        recurrent: row.get::<i64, _>("recurrent") != 0,
        interval: Duration::from_secs(row.get::<i64, _>("interval_secs").max(0) as u64),
    })
}
