use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bastion_control_storage::StorageBackend;
use serde::{Deserialize, Serialize};

use super::AppState;

const SERVICE_NAME: &str = "bastion-control";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub instance_id: String,
    pub uptime_seconds: u64,
    pub storage_healthy: bool,
    pub is_leader: bool,
}

/// Liveness probe: the process is up
///
/// GET /livez
pub async fn livez_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: storage answers its health check
///
/// GET /readyz
pub async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        },
    }
}

/// GET /startupz
pub async fn startupz_handler(state: State<AppState>) -> impl IntoResponse {
    readyz_handler(state).await
}

/// Detailed health report
///
/// GET /healthz
pub async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let storage_healthy = state.storage.health_check().await.is_ok();
    let status = if storage_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = HealthResponse {
        status: if storage_healthy { "healthy" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage_healthy,
        is_leader: state.is_leader(),
    };

    (status, Json(body))
}
