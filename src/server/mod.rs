// src/server/mod.rs

//! Server lifecycle: initialization, daemon spawning, and the accept loop.

use crate::db::DbOptions;
use crate::http::EndpointHandler;
use crate::jobs::Mailer;
use crate::logging::LogBridge;
use crate::queue::JobHandler;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{filter::EnvFilter, reload};

pub mod context;
mod initialization;
mod listener;
mod spawner;

pub use context::ServerContext;

/// A user-registered daemon: given a shutdown receiver, returns the future
/// that runs until shutdown.
pub type DaemonFn = Box<dyn FnOnce(broadcast::Receiver<()>) -> BoxFuture<'static, ()> + Send>;

/// Startup knobs that must exist before the stored configuration can be read.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub db: DbOptions,
    pub identity_path: String,
    pub port_override: Option<u16>,
}

/// Everything the embedding application wires into the framework.
#[derive(Default)]
pub struct Hooks {
    /// Endpoint-name to handler map; names resolve to paths through config.
    pub endpoints: HashMap<String, Arc<dyn EndpointHandler>>,
    /// Job-type to handler map for the executor.
    pub job_handlers: HashMap<String, Arc<dyn JobHandler>>,
    /// Outbound mail implementation; defaults to the logging mailer.
    pub mailer: Option<Arc<dyn Mailer>>,
    /// Extra long-running daemons started and shut down with the server.
    pub daemons: Vec<DaemonFn>,
}

/// The main server startup function, orchestrating all setup phases. Blocks
/// until a termination signal arrives and the graceful drain completes.
pub async fn run(
    options: ServerOptions,
    mut hooks: Hooks,
    bridge: LogBridge,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    let user_daemons = std::mem::take(&mut hooks.daemons);

    // 1. Open the store, decrypt the config, and assemble shared state.
    let mut ctx = initialization::setup(options, hooks, bridge, log_reload_handle).await?;

    // 2. Spawn all background daemons.
    spawner::spawn_all(&mut ctx, user_daemons)?;

    // 3. Accept connections until shutdown.
    listener::run(ctx).await;

    Ok(())
}
