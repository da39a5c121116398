use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bastion_control_types::{CreateJobRequest, CreateJobResponse, Error, JobResponse, entities::Job};

use super::AppState;
use crate::{error::Result, extract::ValidatedJson};

/// Accept a generation request
///
/// POST /control/v1/jobs
///
/// Returns 202 as soon as the job is persisted; generation runs in the
/// background and is observed through [`get_job`].
pub async fn create_job(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>)> {
    let job = state.orchestrator.create_job(&req.owner_id, req.parameters()).await?;
    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse::from(&job))))
}

/// GET /control/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>> {
    if !Job::is_valid_id(&job_id) {
        return Err(Error::not_found("Job not found").into());
    }
    let job = state.orchestrator.get_job(&job_id).await?;
    Ok(Json(job.into()))
}
