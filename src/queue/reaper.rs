// src/queue/reaper.rs

//! Reclaims `processing` rows whose owner died mid-execution.
//!
//! A claimed job cancelled by shutdown or lost to a crash keeps its
//! `processing` status and `locked_at` stamp. Once the visibility timeout
//! passes, the row goes through the standard failure path, so attempts still
//! bound how often a crash-looping handler runs.

use crate::queue::backoff::BackoffPolicy;
use crate::queue::store::JobStore;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct JobReaper {
    store: JobStore,
    interval: Duration,
    visibility_timeout: Duration,
    backoff: BackoffPolicy,
}

impl JobReaper {
    pub fn new(
        store: JobStore,
        interval: Duration,
        visibility_timeout: Duration,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            interval,
            visibility_timeout,
            backoff,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Job reaper started. Visibility timeout: {:?}.",
            self.visibility_timeout
        );
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.reap_stuck(self.visibility_timeout, &self.backoff).await {
                        Ok(0) => {}
                        Ok(n) => warn!(reclaimed = n, "Reclaimed stuck processing jobs."),
                        Err(e) => warn!("Job reap cycle failed: {e}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Job reaper shutting down.");
                    return;
                }
            }
        }
    }
}
