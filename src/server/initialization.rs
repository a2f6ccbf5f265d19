// src/server/initialization.rs

//! Handles the complete server initialization process: opening the store,
//! decrypting and validating the configuration, and assembling the shared
//! application state.

use super::context::ServerContext;
use super::{Hooks, ServerOptions};
use crate::config::Config;
use crate::core::cache::MemoryCache;
use crate::core::state::AppState;
use crate::core::topk::{SlidingTopK, TopKParams};
use crate::core::{ConfigProvider, MillraceError, Snapshot};
use crate::crypto::Identity;
use crate::db;
use crate::http::builtin::{Favicon, ListEndpoints, RequestVerification};
use crate::jobs::{EmailVerificationHandler, JOB_TYPE_EMAIL_VERIFICATION, LogMailer};
use crate::logging::{LogBridge, level_from_str};
use crate::queue::{BackoffPolicy, Executor, JobStore};
use crate::store::{ConfigStore, DEFAULT_SCOPE, LogStore};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Initializes all server components before the accept loop starts.
pub async fn setup(
    options: ServerOptions,
    hooks: Hooks,
    bridge: LogBridge,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    let pool = db::connect(&options.db).await?;
    let log_store = LogStore::new(pool.clone());
    log_store
        .ping()
        .await
        .context("log sink did not answer the startup probe")?;
    let identity = Identity::load(&options.identity_path)
        .with_context(|| format!("loading identity from '{}'", options.identity_path))?;
    let config_store = ConfigStore::new(pool.clone(), identity);

    // The configuration lives in the store; failing to read or decrypt it at
    // startup is fatal.
    let plaintext = match config_store.latest(DEFAULT_SCOPE).await {
        Ok(bytes) => bytes,
        Err(MillraceError::ConfigNotFound(_)) => {
            return Err(anyhow!(
                "no configuration in '{}'; run `millrace-admin --db {} --identity {} init` first",
                options.db.path,
                options.db.path,
                options.identity_path
            ));
        }
        Err(e) => return Err(e.into()),
    };
    let contents = String::from_utf8(plaintext).context("config payload is not valid UTF-8")?;
    let mut config = Config::from_toml(&contents)?;
    config.source = Some(format!("db:{DEFAULT_SCOPE}"));
    if let Some(port) = options.port_override {
        config.server.port = port;
    }

    let snapshot = Snapshot::build(config)?;
    let cfg = &snapshot.config;

    let (log_tx, log_rx) = mpsc::channel(cfg.log.channel_capacity);
    bridge.install(log_tx, level_from_str(&cfg.log.db_level));

    let backoff = BackoffPolicy {
        base: cfg.scheduler.backoff_base,
        max: cfg.scheduler.backoff_max,
    };
    let jobs = JobStore::new(pool.clone());

    let mailer = hooks.mailer.unwrap_or_else(|| Arc::new(LogMailer));
    let mut job_handlers = hooks.job_handlers;
    job_handlers
        .entry(JOB_TYPE_EMAIL_VERIFICATION.to_string())
        .or_insert_with(|| Arc::new(EmailVerificationHandler::new(mailer)));
    let executor = Arc::new(Executor::new(jobs.clone(), job_handlers, backoff));

    let mut endpoints = hooks.endpoints;
    endpoints
        .entry("list_endpoints".to_string())
        .or_insert_with(|| Arc::new(ListEndpoints));
    endpoints
        .entry("favicon".to_string())
        .or_insert_with(|| Arc::new(Favicon));
    endpoints
        .entry("request_verification".to_string())
        .or_insert_with(|| Arc::new(RequestVerification));

    let sketch = SlidingTopK::new(TopKParams::from(&cfg.block_ip));
    let bind_addr = (cfg.server.host.clone(), cfg.server.port);
    let shutdown_timeout = cfg.server.shutdown_timeout;
    let acceptor = setup_tls(cfg)?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let app = Arc::new(AppState {
        db: pool,
        provider: ConfigProvider::new(snapshot),
        config_store,
        sketch: Mutex::new(sketch),
        block_cache: Arc::new(MemoryCache::<IpAddr, ()>::new()),
        endpoints,
        jobs,
        log_bridge: bridge,
        log_reload_handle,
        shutdown_tx: shutdown_tx.clone(),
    });
    info!("Application state initialized.");

    let listener = TcpListener::bind((bind_addr.0.as_str(), bind_addr.1)).await?;
    info!(
        "Millrace server listening on {}:{}{}",
        bind_addr.0,
        bind_addr.1,
        if acceptor.is_some() { " (TLS)" } else { "" }
    );

    Ok(ServerContext {
        app,
        listener,
        acceptor,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        executor,
        log_store,
        log_rx: Some(log_rx),
        shutdown_timeout,
    })
}

/// Sets up the TLS acceptor if TLS is enabled in the configuration.
fn setup_tls(cfg: &Config) -> Result<Option<TlsAcceptor>> {
    if !cfg.server.tls.enabled {
        return Ok(None);
    }
    info!("TLS is enabled. Loading certificate and key.");
    let certs = load_certs(&cfg.server.tls.cert_file)?;
    let key = load_key(&cfg.server.tls.key_file)?;
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file =
        File::open(path).map_err(|e| anyhow!("Failed to open certificate file '{}': {}", path, e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in '{}'", path));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file =
        File::open(path).map_err(|e| anyhow!("Failed to open private key file '{}': {}", path, e))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("No private key found in key file '{}'", path))
}
