// src/http/mod.rs

//! Router assembly and dynamic endpoint dispatch.
//!
//! Routing is two-staged: the pre-router middleware chain runs first, then a
//! single fallback handler resolves `(method, path)` through the current
//! config snapshot to an endpoint name and invokes the registered handler.
//! Because resolution happens per request, a config reload renames endpoints
//! without touching the router.

pub mod builtin;
pub mod middleware;

use crate::core::state::SharedApp;
use async_trait::async_trait;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// Connection-level facts stamped onto every request by the listener.
#[derive(Debug, Clone, Copy)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    /// True when the transport is TLS; drives HSTS emission.
    pub secure: bool,
}

/// An application endpoint. Implementations are registered under a name; the
/// snapshot's endpoint map decides which method and path reach them.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn handle(&self, app: SharedApp, req: Request) -> Response;
}

/// Builds the composed handler: user dispatch behind the ordered pre-router
/// chain. Layers unwind inside-out, so the last layer added runs first.
pub fn build_router(app: SharedApp) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(from_fn_with_state(app.clone(), middleware::block_body::block_body))
        .layer(from_fn_with_state(app.clone(), middleware::maintenance::maintenance))
        .layer(from_fn_with_state(app.clone(), middleware::tls_header::tls_header))
        .layer(from_fn_with_state(app.clone(), middleware::block_ua::block_ua))
        .layer(from_fn_with_state(app.clone(), middleware::block_ip::block_ip))
        .layer(from_fn_with_state(app.clone(), middleware::request_log::request_log))
        .with_state(app)
}

async fn dispatch(State(app): State<SharedApp>, req: Request) -> Response {
    let snapshot = app.provider.get();
    let endpoint = snapshot
        .resolve(req.method(), req.uri().path())
        .map(str::to_owned);

    match endpoint.and_then(|name| app.endpoints.get(&name).cloned()) {
        Some(handler) => handler.handle(app.clone(), req).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
