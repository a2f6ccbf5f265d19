// src/queue/job.rs

//! The durable job record and its construction helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Queue states. A job in `Processing` has exactly one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// One row of the `job_queue` table.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    /// Deduplicating payload; part of the uniqueness key.
    pub payload: Vec<u8>,
    /// Non-deduplicating extra fields.
    pub payload_extra: Vec<u8>,
    pub cooldown_bucket: i64,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub recurrent: bool,
    pub interval: Duration,
}

/// Everything a producer supplies when enqueuing.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub payload: Vec<u8>,
    pub payload_extra: Vec<u8>,
    pub max_attempts: u32,
    /// Defaults to now.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Dedup cooldown; enqueues of the same `(job_type, payload)` within one
    /// cooldown bucket conflict.
    pub cooldown: Duration,
    pub recurrent: bool,
    pub interval: Duration,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            payload_extra: Vec::new(),
            max_attempts: 3,
            scheduled_for: None,
            cooldown: Duration::from_secs(3600),
            recurrent: false,
            interval: Duration::ZERO,
        }
    }

    pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
        self.payload_extra = extra;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn recurring(mut self, interval: Duration) -> Self {
        self.recurrent = true;
        self.interval = interval;
        self
    }
}

/// Coarse time index shared by all producers: buckets align to the UTC epoch,
/// so two clients enqueuing the same notification land in the same bucket.
pub fn cooldown_bucket(at: DateTime<Utc>, cooldown: Duration) -> i64 {
    let secs = cooldown.as_secs().max(1) as i64;
    at.timestamp().div_euclid(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cooldown_bucket_aligns_to_epoch() {
        let cooldown = Duration::from_secs(3600);
        let a = Utc.timestamp_opt(7200, 0).unwrap();
        let b = Utc.timestamp_opt(7200 + 3599, 0).unwrap();
        let c = Utc.timestamp_opt(7200 + 3600, 0).unwrap();
        assert_eq!(cooldown_bucket(a, cooldown), 2);
        assert_eq!(cooldown_bucket(a, cooldown), cooldown_bucket(b, cooldown));
        assert_ne!(cooldown_bucket(a, cooldown), cooldown_bucket(c, cooldown));
    }
}
