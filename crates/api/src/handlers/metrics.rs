use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bastion_control_core::metrics::prometheus_handle;

/// Prometheus text exposition
///
/// GET /metrics
pub async fn metrics_handler() -> Response {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics exporter not installed").into_response(),
    }
}
