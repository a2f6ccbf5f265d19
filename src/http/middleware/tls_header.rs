// src/http/middleware/tls_header.rs

//! Emits the Strict-Transport-Security header on TLS transports.

use crate::core::state::SharedApp;
use crate::http::ClientInfo;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

pub async fn tls_header(State(app): State<SharedApp>, req: Request, next: Next) -> Response {
    let secure = req
        .extensions()
        .get::<ClientInfo>()
        .is_some_and(|info| info.secure);

    let mut response = next.run(req).await;
    if secure {
        let snapshot = app.provider.get();
        let hsts = &snapshot.config.hsts;
        let mut value = format!("max-age={}", hsts.max_age_secs);
        if hsts.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if hsts.preload {
            value.push_str("; preload");
        }
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert("strict-transport-security", header_value);
        }
    }
    response
}
