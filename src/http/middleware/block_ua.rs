// src/http/middleware/block_ua.rs

//! Rejects requests whose User-Agent matches the configured deny pattern.

use crate::core::state::SharedApp;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub async fn block_ua(State(app): State<SharedApp>, req: Request, next: Next) -> Response {
    let snapshot = app.provider.get();
    if let Some(pattern) = &snapshot.ua_regex
        && let Some(user_agent) = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        && pattern.is_match(user_agent)
    {
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(req).await
}
