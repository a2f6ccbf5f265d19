// src/queue/executor.rs

//! Dispatches claimed jobs to their type handlers and writes the outcome
//! back to the queue.

use crate::queue::backoff::BackoffPolicy;
use crate::queue::handler::{JobError, JobHandler};
use crate::queue::job::Job;
use crate::queue::store::JobStore;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub struct Executor {
    store: JobStore,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    /// One async mutex per job type; holding it across the handler call gives
    /// at most one concurrent worker per type.
    type_locks: DashMap<String, Arc<Mutex<()>>>,
    backoff: BackoffPolicy,
}

impl Executor {
    pub fn new(
        store: JobStore,
        handlers: HashMap<String, Arc<dyn JobHandler>>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            handlers,
            type_locks: DashMap::new(),
            backoff,
        }
    }

    /// Runs one claimed job to its terminal state for this attempt. Outcome
    /// write-backs that fail are logged; the reaper picks the row up later.
    pub async fn execute(&self, job: Job, cancel: CancellationToken) {
        let lock = self
            .type_locks
            .entry(job.job_type.clone())
            .or_default()
            .value()
            .clone();
        let _serialized = lock.lock().await;

        let Some(handler) = self.handlers.get(&job.job_type) else {
            warn!(job_type = %job.job_type, id = job.id, "No handler registered for claimed job.");
            if let Err(e) = self
                .store
                .fail_permanent(job.id, &format!("no handler for job type '{}'", job.job_type))
                .await
            {
                error!(id = job.id, "Could not mark handlerless job failed: {e}");
            }
            return;
        };

        let outcome = handler.handle(&job, cancel).await;
        let result = match outcome {
            Ok(()) => self.store.complete(job.id).await,
            Err(JobError::Retryable(msg)) => self.store.fail(job.id, &msg, &self.backoff).await,
            Err(JobError::Permanent(msg)) => self.store.fail_permanent(job.id, &msg).await,
        };
        if let Err(e) = result {
            error!(id = job.id, job_type = %job.job_type, "Failed to record job outcome: {e}");
        }
    }
}
