// src/http/middleware/block_body.rs

//! Optional request body cap with an exempt-paths list. The declared
//! Content-Length is checked before the body is read.

use crate::core::state::SharedApp;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub async fn block_body(State(app): State<SharedApp>, req: Request, next: Next) -> Response {
    let snapshot = app.provider.get();
    let cfg = &snapshot.config.block_body;
    if !cfg.activated {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if cfg.exempt_paths.iter().any(|exempt| exempt == path) {
        return next.run(req).await;
    }

    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(length) = declared
        && length > cfg.limit_bytes
    {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    next.run(req).await
}
