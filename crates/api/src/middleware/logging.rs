use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use bastion_control_core::metrics;

/// Log and count every request
///
/// Only method, route pattern, status and latency are recorded; bodies and
/// headers never are.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    metrics::record_http_request(&method, &path, status, elapsed.as_secs_f64());

    if response.status().is_server_error() {
        tracing::warn!(method = %method, path = %path, status, latency_ms = elapsed.as_millis() as u64, "Request completed");
    } else {
        tracing::info!(method = %method, path = %path, status, latency_ms = elapsed.as_millis() as u64, "Request completed");
    }

    response
}
