// src/http/builtin.rs

//! Endpoints the framework serves itself.

use crate::core::MillraceError;
use crate::core::state::SharedApp;
use crate::http::EndpointHandler;
use crate::jobs::verification_job;
use async_trait::async_trait;
use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::error;

/// Largest accepted body for the framework's own JSON endpoints.
const BUILTIN_BODY_LIMIT: usize = 64 * 1024;

/// `list_endpoints`: the endpoint map of the current snapshot as JSON.
pub struct ListEndpoints;

#[async_trait]
impl EndpointHandler for ListEndpoints {
    async fn handle(&self, app: SharedApp, _req: Request) -> Response {
        let snapshot = app.provider.get();
        Json(snapshot.config.endpoints.clone()).into_response()
    }
}

/// `favicon`: browsers ask, we decline politely.
pub struct Favicon;

#[async_trait]
impl EndpointHandler for Favicon {
    async fn handle(&self, _app: SharedApp, _req: Request) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

/// `request_verification`: enqueues the verification mail for an address.
/// Repeats within one cooldown window collapse into the already-queued job,
/// so the response is 204 either way.
pub struct RequestVerification;

#[derive(Deserialize)]
struct VerificationRequest {
    email: String,
}

#[async_trait]
impl EndpointHandler for RequestVerification {
    async fn handle(&self, app: SharedApp, req: Request) -> Response {
        let (cooldown, max_attempts) = {
            let snapshot = app.provider.get();
            (
                snapshot.config.scheduler.cooldown,
                snapshot.config.scheduler.max_attempts,
            )
        };

        let Ok(bytes) = axum::body::to_bytes(req.into_body(), BUILTIN_BODY_LIMIT).await else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        let Ok(body) = serde_json::from_slice::<VerificationRequest>(&bytes) else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        if !body.email.contains('@') {
            return StatusCode::BAD_REQUEST.into_response();
        }

        match app
            .jobs
            .enqueue(verification_job(&body.email, cooldown, max_attempts))
            .await
        {
            Ok(_) | Err(MillraceError::AlreadyQueued) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => {
                error!("Could not enqueue verification job: {e}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
