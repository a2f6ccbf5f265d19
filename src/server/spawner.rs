// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use crate::queue::{BackoffPolicy, JobReaper, Scheduler};
use crate::tasks::{CacheSweeper, LogDaemon};
use anyhow::{Result, anyhow};

/// Spawns the declared daemons into the context's JoinSet: the log daemon,
/// the job scheduler, the stuck-job reaper, the block-cache sweeper, and any
/// user-registered daemons.
pub fn spawn_all(ctx: &mut ServerContext, user_daemons: Vec<super::DaemonFn>) -> Result<()> {
    let snapshot = ctx.app.provider.get();
    let cfg = &snapshot.config;

    // --- Log daemon ---
    let log_rx = ctx
        .log_rx
        .take()
        .ok_or_else(|| anyhow!("log channel receiver already consumed"))?;
    let log_daemon = LogDaemon::new(
        ctx.log_store.clone(),
        log_rx,
        ctx.app.log_bridge.clone(),
        cfg.log.batch_size,
        cfg.log.flush_interval,
    );
    let shutdown_rx_log = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(log_daemon.run(shutdown_rx_log));

    // --- Job scheduler ---
    let scheduler = Scheduler::new(
        ctx.app.jobs.clone(),
        ctx.executor.clone(),
        cfg.scheduler.interval,
        cfg.scheduler.claim_batch,
        cfg.server.shutdown_timeout,
    );
    let shutdown_rx_sched = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(scheduler.run(shutdown_rx_sched));

    // --- Stuck-job reaper ---
    let reaper = JobReaper::new(
        ctx.app.jobs.clone(),
        cfg.scheduler.interval,
        cfg.scheduler.visibility_timeout,
        BackoffPolicy {
            base: cfg.scheduler.backoff_base,
            max: cfg.scheduler.backoff_max,
        },
    );
    let shutdown_rx_reaper = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(reaper.run(shutdown_rx_reaper));

    // --- Block cache sweeper ---
    let sweeper = CacheSweeper::new(ctx.app.block_cache.clone());
    let shutdown_rx_sweep = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(sweeper.run(shutdown_rx_sweep));

    // --- User daemons ---
    for daemon in user_daemons {
        let shutdown_rx = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(daemon(shutdown_rx));
    }

    Ok(())
}
