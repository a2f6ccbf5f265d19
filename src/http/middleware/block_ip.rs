// src/http/middleware/block_ip.rs

//! The adaptive IP circuit breaker in front of the router.
//!
//! Already-blocked sources are rejected from the cache without touching the
//! sketch. Everyone else is counted; when a completed tick reports heavy
//! hitters, they are inserted into the cache with the configured TTL and
//! rejected from the next request on.

use crate::core::cache::Cache;
use crate::core::state::SharedApp;
use crate::http::ClientInfo;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

pub async fn block_ip(State(app): State<SharedApp>, req: Request, next: Next) -> Response {
    let snapshot = app.provider.get();
    if !snapshot.config.block_ip.enabled {
        return next.run(req).await;
    }

    let Some(info) = req.extensions().get::<ClientInfo>().copied() else {
        // No transport info, nothing to count.
        return next.run(req).await;
    };
    let ip = info.addr.ip();

    if app.block_cache.get(&ip).is_some() {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    // The sketch mutex is held only across the increment and (rarely) the
    // tick walk; no await happens inside.
    let tick_result = app.sketch.lock().observe(ip);

    if let Some(blocked) = tick_result
        && !blocked.is_empty()
    {
        let ttl = snapshot.config.block_ip.block_ttl;
        for offender in &blocked {
            app.block_cache.set(*offender, (), Some(ttl));
        }
        warn!(
            target: "millrace::block_ip",
            count = blocked.len(),
            ttl_secs = ttl.as_secs(),
            "Blocking heavy-hitter IPs."
        );
    }

    next.run(req).await
}
