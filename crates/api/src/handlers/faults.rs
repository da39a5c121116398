//! Fault-management routes. These routes are never degraded by the rules
//! they manage.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
};
use bastion_control_core::InjectionOutcome;
use bastion_control_types::{
    ClearFaultsResponse, InjectFailureRequest, InjectLatencyRequest, InjectionResponse,
    ListFaultsResponse, validation::validate_service_name,
};

use super::AppState;
use crate::{error::Result, extract::ValidatedJson};

fn injection_response(outcome: InjectionOutcome) -> Json<InjectionResponse> {
    Json(InjectionResponse {
        success: true,
        applied: outcome.applied,
        message: outcome.message,
        expires_at: outcome.expires_at,
    })
}

/// POST /control/v1/faults/latency
pub async fn inject_latency(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<InjectLatencyRequest>,
) -> Result<Json<InjectionResponse>> {
    let outcome = state
        .faults
        .inject_latency(
            &req.target_service,
            req.duration_ms,
            req.probability(),
            req.window_seconds.map(Duration::from_secs),
        )
        .await?;
    Ok(injection_response(outcome))
}

/// POST /control/v1/faults/failure
pub async fn inject_failure(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<InjectFailureRequest>,
) -> Result<Json<InjectionResponse>> {
    let outcome = state
        .faults
        .inject_failure(
            &req.target_service,
            &req.message,
            req.probability(),
            req.window_seconds.map(Duration::from_secs),
        )
        .await?;
    Ok(injection_response(outcome))
}

/// GET /control/v1/faults
pub async fn list_faults(State(state): State<AppState>) -> Json<ListFaultsResponse> {
    let faults = state.faults.list().await.into_iter().map(Into::into).collect();
    Json(ListFaultsResponse { faults })
}

/// DELETE /control/v1/faults
pub async fn clear_faults(State(state): State<AppState>) -> Json<ClearFaultsResponse> {
    let removed = state.faults.clear().await;
    Json(ClearFaultsResponse { success: true, removed })
}

/// DELETE /control/v1/faults/{service}
pub async fn clear_service_faults(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ClearFaultsResponse>> {
    validate_service_name("service", &service)?;
    let removed = state.faults.clear_service(&service).await;
    Ok(Json(ClearFaultsResponse { success: true, removed }))
}
