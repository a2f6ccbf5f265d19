// src/http/middleware/maintenance.rs

//! The maintenance gate: while activated, every request short-circuits with
//! 503 and a retry hint.

use crate::core::state::SharedApp;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub async fn maintenance(State(app): State<SharedApp>, req: Request, next: Next) -> Response {
    let snapshot = app.provider.get();
    if snapshot.config.maintenance.activated {
        let retry_after = snapshot.config.maintenance.retry_after_secs.to_string();
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, retry_after)],
            "temporarily down for maintenance\n",
        )
            .into_response();
    }
    next.run(req).await
}
