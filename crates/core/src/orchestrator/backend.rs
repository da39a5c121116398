use std::time::Duration;

use async_trait::async_trait;
use bastion_control_types::{entities::JobParameters, error::Result};
use tokio::time::Instant;

use crate::faults::FaultInjector;

/// Fault-injection target name for the generation backend
pub const GENERATION_SERVICE: &str = "generation";

/// Reference to work accepted by a generation backend
#[derive(Debug, Clone)]
pub struct BackendHandle {
    pub job_id: String,
    /// Backend-side identifier of the submitted work
    pub external_id: String,
    pub submitted_at: Instant,
}

/// Progress reported by a generation backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Running,
    Succeeded { result_reference: String },
    Failed { reason: String },
}

/// External system that performs the actual content generation
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Hand a job to the backend; returns once the work is accepted
    async fn submit(&self, job_id: &str, parameters: &JobParameters) -> Result<BackendHandle>;

    /// Ask the backend how the submitted work is going
    async fn poll_status(&self, handle: &BackendHandle) -> Result<BackendStatus>;
}

/// Backend that accepts everything and "finishes" after a fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    processing_time: Duration,
    result_base_url: String,
}

impl SimulatedBackend {
    pub fn new(processing_time: Duration, result_base_url: impl Into<String>) -> Self {
        Self {
            processing_time,
            result_base_url: result_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GenerationBackend for SimulatedBackend {
    async fn submit(&self, job_id: &str, parameters: &JobParameters) -> Result<BackendHandle> {
        tracing::debug!(
            job_id,
            style = %parameters.style,
            duration_seconds = parameters.duration_seconds,
            "Simulated backend accepted job"
        );
        Ok(BackendHandle {
            job_id: job_id.to_string(),
            external_id: format!("sim-{job_id}"),
            submitted_at: Instant::now(),
        })
    }

    async fn poll_status(&self, handle: &BackendHandle) -> Result<BackendStatus> {
        if handle.submitted_at.elapsed() < self.processing_time {
            return Ok(BackendStatus::Running);
        }
        Ok(BackendStatus::Succeeded {
            result_reference: format!("{}/{}.mp4", self.result_base_url, handle.job_id),
        })
    }
}

/// Wraps a backend so fault rules targeting `generation` degrade its calls
pub struct FaultInjectingBackend<B> {
    inner: B,
    faults: FaultInjector,
}

impl<B: GenerationBackend> FaultInjectingBackend<B> {
    pub fn new(inner: B, faults: FaultInjector) -> Self {
        Self { inner, faults }
    }
}

#[async_trait]
impl<B: GenerationBackend> GenerationBackend for FaultInjectingBackend<B> {
    async fn submit(&self, job_id: &str, parameters: &JobParameters) -> Result<BackendHandle> {
        self.faults.apply(GENERATION_SERVICE).await?;
        self.inner.submit(job_id, parameters).await
    }

    async fn poll_status(&self, handle: &BackendHandle) -> Result<BackendStatus> {
        self.faults.apply(GENERATION_SERVICE).await?;
        self.inner.poll_status(handle).await
    }
}
