// src/server/listener.rs

//! The accept loop: plain or TLS connections, served until a termination
//! signal arrives, then a bounded graceful drain.

use super::context::ServerContext;
use crate::http::{ClientInfo, build_router};
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// Runs the accept loop until shutdown, then drains daemons and in-flight
/// connections up to the configured deadline.
pub async fn run(mut ctx: ServerContext) {
    let router = build_router(ctx.app.clone());
    let mut shutdown_rx = ctx.shutdown_tx.subscribe();
    let mut connections: JoinSet<()> = JoinSet::new();

    #[cfg(unix)]
    let mut reload_signal =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()).ok();
    #[cfg(not(unix))]
    let mut reload_signal = ();

    loop {
        tokio::select! {
            _ = reload_signal_recv(&mut reload_signal) => {
                info!("SIGHUP received. Reloading configuration.");
                match ctx.app.reload_config().await {
                    Ok(()) => info!("Configuration reloaded."),
                    Err(e) => warn!("Configuration reload failed, keeping current snapshot: {e}"),
                }
            }
            accepted = ctx.listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let router = router.clone();
                        let acceptor = ctx.acceptor.clone();
                        connections.spawn(async move {
                            handle_connection(stream, peer, acceptor, router).await;
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {e}"),
                }
            }
            _ = wait_for_signal() => {
                info!("Termination signal received. Shutting down.");
                let _ = ctx.shutdown_tx.send(());
                break;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested. Stopping accept loop.");
                break;
            }
        }
    }

    let drain = async {
        while ctx.background_tasks.join_next().await.is_some() {}
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(ctx.shutdown_timeout, drain).await.is_err() {
        warn!(
            "Shutdown deadline ({:?}) elapsed; aborting remaining tasks.",
            ctx.shutdown_timeout
        );
        ctx.background_tasks.abort_all();
        connections.abort_all();
    }
    info!("Server stopped.");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    router: Router,
) {
    match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_stream(TokioIo::new(tls_stream), peer, true, router).await,
            Err(e) => debug!("TLS handshake with {peer} failed: {e}"),
        },
        None => serve_stream(TokioIo::new(stream), peer, false, router).await,
    }
}

/// Serves one connection, stamping every request with its transport facts so
/// the pre-router can count the source and decide on HSTS.
async fn serve_stream<I>(io: I, peer: SocketAddr, secure: bool, router: Router)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request
            .extensions_mut()
            .insert(ClientInfo { addr: peer, secure });
        router.clone().oneshot(request)
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
    {
        debug!("Connection from {peer} ended with error: {e}");
    }
}

#[cfg(unix)]
async fn reload_signal_recv(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn reload_signal_recv(_signal: &mut ()) {
    std::future::pending::<()>().await
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
