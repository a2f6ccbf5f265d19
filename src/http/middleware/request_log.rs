// src/http/middleware/request_log.rs

//! Emits one structured record per request into the log pipeline.

use crate::core::state::SharedApp;
use crate::http::ClientInfo;
use crate::http::middleware::truncate;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::info;

pub async fn request_log(State(app): State<SharedApp>, req: Request, next: Next) -> Response {
    let snapshot = app.provider.get();
    if !snapshot.config.request_log.activated {
        return next.run(req).await;
    }
    let limit = snapshot.config.request_log.field_limit;

    let method = req.method().to_string();
    let uri = truncate(&req.uri().to_string(), limit).to_string();
    let remote = req
        .extensions()
        .get::<ClientInfo>()
        .map(|info| info.addr.ip().to_string())
        .unwrap_or_default();
    let user_agent = header_value(&req, header::USER_AGENT, limit);
    let referer = header_value(&req, header::REFERER, limit);

    let start = Instant::now();
    let response = next.run(req).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let bytes = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    info!(
        target: "millrace::request",
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        bytes,
        duration_ms,
        remote = %truncate(&remote, limit),
        user_agent = %user_agent,
        referer = %referer,
        "request"
    );
    response
}

fn header_value(req: &Request, name: header::HeaderName, limit: usize) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| truncate(v, limit).to_string())
        .unwrap_or_default()
}
