// src/queue/scheduler.rs

//! The periodic claimer: wakes on a fixed interval, claims due jobs, and
//! hands each to the executor in its own task.

use crate::queue::executor::Executor;
use crate::queue::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Scheduler {
    store: JobStore,
    executor: Arc<Executor>,
    interval: Duration,
    claim_batch: u32,
    /// How long shutdown waits for in-flight jobs before aborting them.
    drain_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        store: JobStore,
        executor: Arc<Executor>,
        interval: Duration,
        claim_batch: u32,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            interval,
            claim_batch,
            drain_timeout,
        }
    }

    /// The main run loop. On shutdown the cancellation token fans out to all
    /// in-flight handlers, and the loop waits for them to drain or for the
    /// drain deadline to pass, whichever comes first.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Job scheduler started. Interval: {:?}, claim batch: {}.",
            self.interval, self.claim_batch
        );
        let cancel = CancellationToken::new();
        let mut inflight: JoinSet<()> = JoinSet::new();
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Reap finished tasks so the set does not grow unbounded.
                    while inflight.try_join_next().is_some() {}

                    match self.store.claim(self.claim_batch).await {
                        Ok(jobs) => {
                            if !jobs.is_empty() {
                                debug!(claimed = jobs.len(), "Dispatching claimed jobs.");
                            }
                            for job in jobs {
                                let executor = self.executor.clone();
                                let token = cancel.child_token();
                                inflight.spawn(async move {
                                    executor.execute(job, token).await;
                                });
                            }
                        }
                        Err(e) => warn!("Job claim failed: {e}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Job scheduler shutting down. Draining in-flight jobs.");
                    cancel.cancel();
                    let drain = async {
                        while inflight.join_next().await.is_some() {}
                    };
                    if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
                        warn!(
                            "Drain deadline ({:?}) elapsed; aborting remaining job tasks.",
                            self.drain_timeout
                        );
                        inflight.abort_all();
                    }
                    return;
                }
            }
        }
    }
}
