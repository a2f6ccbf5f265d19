// src/core/state.rs

//! Defines the central `AppState` struct, the aggregate passed to middleware,
//! handlers, and background tasks.

use crate::core::cache::Cache;
use crate::core::provider::ConfigProvider;
use crate::core::topk::SlidingTopK;
use crate::core::MillraceError;
use crate::http::EndpointHandler;
use crate::logging::LogBridge;
use crate::queue::JobStore;
use crate::store::{self, ConfigStore};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::{filter::EnvFilter, reload};

/// The central struct holding all shared application-wide state. It is
/// wrapped in an `Arc` and handed to every request task and daemon; none of
/// the back-references own it, the server's lifetime dominates.
pub struct AppState {
    /// The shared pool; endpoint and job handlers registered by the
    /// embedding application run their own queries through it.
    pub db: SqlitePool,
    /// Single source of the active config snapshot.
    pub provider: ConfigProvider,
    pub config_store: ConfigStore,
    /// The IP blocker's sketch. One of the two locks in the core; the
    /// critical section never awaits.
    pub sketch: Mutex<SlidingTopK>,
    /// Blocked sources, keyed by address, expiring on the configured TTL.
    pub block_cache: Arc<dyn Cache<IpAddr, ()>>,
    /// Endpoint-name to handler map; paths resolve through the snapshot.
    pub endpoints: HashMap<String, Arc<dyn EndpointHandler>>,
    pub jobs: JobStore,
    pub log_bridge: LogBridge,
    /// A handle to the logging filter, allowing the log level to follow
    /// config reloads without a restart.
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

pub type SharedApp = Arc<AppState>;

impl AppState {
    /// Re-reads the latest stored config and atomically publishes the new
    /// snapshot. On error the running snapshot is untouched.
    pub async fn reload_config(&self) -> Result<(), MillraceError> {
        store::reload(&self.config_store, &self.provider).await?;

        // RUST_LOG set by the operator keeps precedence over the stored level.
        if std::env::var("RUST_LOG").is_err() {
            let level = self.provider.get().config.log.db_level.clone();
            if let Err(e) = self.log_reload_handle.reload(EnvFilter::new(&level)) {
                warn!("Could not apply log level '{level}' from reloaded config: {e}");
            }
        }
        Ok(())
    }
}
