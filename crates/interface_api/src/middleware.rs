//! API middleware

use axum::{body::Body, http::HeaderName, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request logging middleware
///
/// One line per request with its id, status and latency. Server errors are
/// logged at warn.
pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        warn!(%method, %uri, %request_id, status = status.as_u16(), duration_ms, "API request failed");
    } else {
        info!(%method, %uri, %request_id, status = status.as_u16(), duration_ms, "API request");
    }

    response
}
