// src/tasks/log_daemon.rs

//! Drains the bounded log channel into batched database inserts.
//!
//! A batch is flushed when it reaches `batch_size` or when the flush interval
//! elapses, whichever comes first. On shutdown the channel is closed and the
//! daemon drains until empty before exiting. Insert failures go to a stderr
//! fallback and the batch is dropped; producers never wait on the database.

use crate::logging::{LogBridge, LogRecord};
use crate::store::LogStore;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

pub struct LogDaemon {
    store: LogStore,
    rx: mpsc::Receiver<LogRecord>,
    bridge: LogBridge,
    batch_size: usize,
    flush_interval: Duration,
}

impl LogDaemon {
    pub fn new(
        store: LogStore,
        rx: mpsc::Receiver<LogRecord>,
        bridge: LogBridge,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            store,
            rx,
            bridge,
            batch_size,
            flush_interval,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Log daemon started. Batch size: {}, flush interval: {:?}.",
            self.batch_size, self.flush_interval
        );
        let mut batch: Vec<LogRecord> = Vec::with_capacity(self.batch_size);
        let mut flush_tick = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Log daemon shutting down. Draining channel.");
                    self.rx.close();
                    while let Some(record) = self.rx.recv().await {
                        batch.push(record);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    self.flush(&mut batch).await;
                    return;
                }
                maybe_record = self.rx.recv() => {
                    match maybe_record {
                        Some(record) => {
                            batch.push(record);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => {
                            self.flush(&mut batch).await;
                            return;
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }
    }

    /// Persists and clears the batch. Failures must not feed back into the
    /// pipeline being flushed, hence the stderr fallback.
    async fn flush(&self, batch: &mut Vec<LogRecord>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.store.insert_batch(batch).await {
            eprintln!("millrace: log batch insert failed, dropping {} records: {e}", batch.len());
        }
        batch.clear();

        let dropped = self.bridge.take_dropped();
        if dropped > 0 {
            eprintln!("millrace: log channel full, dropped {dropped} records");
        }
    }
}
