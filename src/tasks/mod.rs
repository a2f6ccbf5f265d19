// src/tasks/mod.rs

//! Long-running background tasks that support the framework: log batching
//! and block-cache maintenance. The job-queue daemons live in `queue`.

pub mod cache_sweeper;
pub mod log_daemon;

pub use cache_sweeper::CacheSweeper;
pub use log_daemon::LogDaemon;
