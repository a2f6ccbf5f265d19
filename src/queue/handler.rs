// src/queue/handler.rs

//! The contract between the executor and application-provided job handlers.

use crate::queue::job::Job;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How a handler reports failure. Retryable errors go through the backoff
/// schedule; permanent errors mark the job `failed` immediately regardless of
/// remaining attempts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

/// One handler instance exists per job type. The executor serializes
/// invocations per type; a handler may still parallelize internally.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Processes one claimed job. Implementations should watch `cancel` and
    /// return early on shutdown; a cancelled job is reclaimed later by the
    /// visibility-timeout reaper.
    async fn handle(&self, job: &Job, cancel: CancellationToken) -> Result<(), JobError>;
}
