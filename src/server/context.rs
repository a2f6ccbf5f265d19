// src/server/context.rs

//! The fully initialized server context, produced by `initialization::setup`
//! and consumed by the spawner and the accept loop.

use crate::core::state::SharedApp;
use crate::logging::LogRecord;
use crate::queue::Executor;
use crate::store::LogStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

pub struct ServerContext {
    pub app: SharedApp,
    pub listener: TcpListener,
    /// Present when TLS is enabled; the accept loop wraps every connection.
    pub acceptor: Option<TlsAcceptor>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
    pub executor: Arc<Executor>,
    /// Probed during initialization, drained into by the log daemon.
    pub log_store: LogStore,
    /// Consumed by the spawner when it starts the log daemon.
    pub log_rx: Option<mpsc::Receiver<LogRecord>>,
    pub shutdown_timeout: Duration,
}
