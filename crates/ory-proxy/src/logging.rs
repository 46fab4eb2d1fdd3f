//! Request logging middleware.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::router::classify;
use crate::state::ProxyState;

/// Log every request with its route, status and duration.
///
/// Only the path is logged. Query strings routinely carry flow IDs and
/// one-time codes.
pub async fn request_logging_middleware(
    State(state): State<ProxyState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let route = classify(&path, &state.config).as_str();

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    match status {
        500.. => tracing::error!(
            %method, %path, route, status, elapsed_ms,
            "Proxy answered with server error"
        ),
        400..=499 => tracing::warn!(
            %method, %path, route, status, elapsed_ms,
            "Proxy answered with client error"
        ),
        _ => tracing::info!(%method, %path, route, status, elapsed_ms, "Proxied"),
    }

    response
}
