// src/tasks/cache_sweeper.rs

//! Periodically drops expired entries from the block cache so long-quiet
//! offenders do not pin memory until their next request.

use crate::core::cache::Cache;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// The interval at which the sweeper runs its cycle.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct CacheSweeper {
    cache: Arc<dyn Cache<IpAddr, ()>>,
}

impl CacheSweeper {
    pub fn new(cache: Arc<dyn Cache<IpAddr, ()>>) -> Self {
        Self { cache }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Block cache sweeper started.");
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.cache.purge_expired();
                    if removed > 0 {
                        debug!(removed, "Swept expired block cache entries.");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Block cache sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
