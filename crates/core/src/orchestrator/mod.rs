//! Asynchronous generation job lifecycle.
//!
//! `create_job` validates, persists a PENDING job and returns immediately. A
//! spawned driver task then walks the job through PROCESSING to a terminal
//! state by talking to a [`GenerationBackend`]. Each driver runs inside a
//! supervisor task so a panic in backend code still leaves the job FAILED
//! rather than stuck.

pub mod backend;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub use backend::{
    BackendHandle, BackendStatus, FaultInjectingBackend, GENERATION_SERVICE, GenerationBackend,
    SimulatedBackend,
};
use bastion_control_const::{
    duration::{
        BACKEND_CALL_TIMEOUT_MS, JOB_DRIVER_LEASE_TTL_SECONDS, JOB_MAX_RUNTIME_SECONDS,
        JOB_POLL_INTERVAL_MS,
    },
    limits::{
        ASPECT_RATIOS, GENERATION_STYLES, MAX_GENERATION_SECONDS, MAX_OWNER_ID_LENGTH,
        MAX_PROMPT_LENGTH, MIN_GENERATION_SECONDS, MIN_PROMPT_LENGTH, QUALITY_LEVELS,
    },
};
use bastion_control_storage::StorageBackend;
use bastion_control_types::{
    entities::{Job, JobParameters, JobStatus, JobTransition},
    error::{Error, Result},
    redact_text,
    validation::{FieldError, codes},
};
use bon::Builder;
use chrono::Utc;
use tokio::{sync::watch, time::Instant};

use crate::repository::JobRepository;

/// Consecutive failed polls after which a job is given up on
const MAX_CONSECUTIVE_POLL_ERRORS: u32 = 3;

/// Error detail recorded when the driver task panics
const PANIC_ERROR_DETAIL: &str = "Internal error during generation";

/// Error detail recorded for jobs whose driver is gone
pub(crate) const INTERRUPTED_ERROR_DETAIL: &str = "Job interrupted by restart";

/// Identity and timing knobs for the job driver
#[derive(Debug, Clone, Builder)]
pub struct OrchestratorConfig {
    /// Recorded on every job this orchestrator drives
    #[builder(into, default = "local".to_string())]
    pub instance_id: String,
    #[builder(default = Duration::from_millis(JOB_POLL_INTERVAL_MS))]
    pub poll_interval: Duration,
    #[builder(default = Duration::from_secs(JOB_MAX_RUNTIME_SECONDS))]
    pub max_runtime: Duration,
    /// Upper bound on any single submit or poll call
    #[builder(default = Duration::from_millis(BACKEND_CALL_TIMEOUT_MS))]
    pub backend_call_timeout: Duration,
    /// Minimum driver lease; stretched to outlast the longest gap between renewals
    #[builder(default = Duration::from_secs(JOB_DRIVER_LEASE_TTL_SECONDS))]
    pub driver_lease_ttl: Duration,
}

impl OrchestratorConfig {
    /// Lease TTL actually written on each renewal
    pub fn effective_lease_ttl(&self) -> Duration {
        self.driver_lease_ttl.max((self.poll_interval + self.backend_call_timeout) * 2)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Check generation parameters against the accepted ranges
///
/// All violations are reported together as one validation error.
pub fn validate_parameters(owner_id: &str, parameters: &JobParameters) -> Result<()> {
    let mut errors = Vec::new();

    let owner_len = owner_id.chars().count();
    if owner_len == 0 || owner_len > MAX_OWNER_ID_LENGTH {
        errors.push(FieldError::new(
            "ownerId",
            format!("ownerId must be between 1 and {MAX_OWNER_ID_LENGTH} characters"),
            if owner_len == 0 { codes::TOO_SMALL } else { codes::TOO_BIG },
        ));
    }

    let prompt_len = parameters.prompt.trim().chars().count();
    if prompt_len < MIN_PROMPT_LENGTH {
        errors.push(FieldError::new(
            "prompt",
            format!("prompt must be at least {MIN_PROMPT_LENGTH} characters"),
            codes::TOO_SMALL,
        ));
    } else if prompt_len > MAX_PROMPT_LENGTH {
        errors.push(FieldError::new(
            "prompt",
            format!("prompt must be at most {MAX_PROMPT_LENGTH} characters"),
            codes::TOO_BIG,
        ));
    }

    if parameters.duration_seconds < MIN_GENERATION_SECONDS {
        errors.push(FieldError::new(
            "durationSeconds",
            format!("durationSeconds must be at least {MIN_GENERATION_SECONDS}"),
            codes::TOO_SMALL,
        ));
    } else if parameters.duration_seconds > MAX_GENERATION_SECONDS {
        errors.push(FieldError::new(
            "durationSeconds",
            format!("durationSeconds must be at most {MAX_GENERATION_SECONDS}"),
            codes::TOO_BIG,
        ));
    }

    for (path, value, allowed) in [
        ("style", &parameters.style, GENERATION_STYLES),
        ("aspectRatio", &parameters.aspect_ratio, ASPECT_RATIOS),
        ("quality", &parameters.quality, QUALITY_LEVELS),
    ] {
        if !allowed.contains(&value.as_str()) {
            errors.push(FieldError::new(
                path,
                format!("{path} must be one of: {}", allowed.join(", ")),
                codes::INVALID_ENUM_VALUE,
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation_details("Invalid generation parameters", errors))
    }
}

/// Owns job creation and drives every accepted job to a terminal state
pub struct JobOrchestrator<S: StorageBackend + Clone + 'static> {
    jobs: Arc<JobRepository<S>>,
    backend: Arc<dyn GenerationBackend>,
    config: OrchestratorConfig,
    watchers: Arc<Mutex<HashMap<String, watch::Sender<JobStatus>>>>,
    active: Arc<AtomicUsize>,
}

impl<S: StorageBackend + Clone + 'static> Clone for JobOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            watchers: Arc::clone(&self.watchers),
            active: Arc::clone(&self.active),
        }
    }
}

impl<S: StorageBackend + Clone + 'static> JobOrchestrator<S> {
    pub fn new(storage: S, backend: Arc<dyn GenerationBackend>, config: OrchestratorConfig) -> Self {
        Self {
            jobs: Arc::new(JobRepository::new(storage)),
            backend,
            config,
            watchers: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of jobs whose driver is still running in this process
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Validate and persist a new job, then start driving it in the background
    ///
    /// Returns the PENDING job without waiting on the backend.
    pub async fn create_job(&self, owner_id: &str, parameters: JobParameters) -> Result<Job> {
        validate_parameters(owner_id, &parameters)?;

        let parameters = JobParameters { prompt: parameters.prompt.trim().to_string(), ..parameters };
        self.renew_driver_lease().await?;
        let job = Job::new(owner_id, parameters).with_driver(&self.config.instance_id);
        self.jobs.create(&job).await?;

        let (sender, _) = watch::channel(JobStatus::Pending);
        self.lock_watchers().insert(job.id.clone(), sender);

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        crate::metrics::record_job_created();
        crate::metrics::set_active_jobs(active);
        tracing::info!(job_id = %job.id, owner_id, "Job created");

        let this = self.clone();
        let job_id = job.id.clone();
        let params = job.parameters.clone();
        tokio::spawn(async move { this.supervise(job_id, params).await });

        Ok(job)
    }

    /// Current state of a job; never waits on the backend
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Job {job_id} not found")))
    }

    /// Receive status changes of a job
    ///
    /// For a job no longer driven by this process the receiver holds the
    /// stored status and never changes.
    pub async fn subscribe(&self, job_id: &str) -> Result<watch::Receiver<JobStatus>> {
        if let Some(sender) = self.lock_watchers().get(job_id) {
            return Ok(sender.subscribe());
        }

        let job = self.get_job(job_id).await?;
        let (_, receiver) = watch::channel(job.status);
        Ok(receiver)
    }

    /// Wait up to `timeout` for a job to reach a terminal state
    ///
    /// Returns the job as stored when the wait ends, terminal or not.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Result<Job> {
        let mut receiver = self.subscribe(job_id).await?;

        let _ = tokio::time::timeout(timeout, async {
            loop {
                if receiver.borrow_and_update().is_terminal() {
                    break;
                }
                // Sender dropped: the driver is done and storage has the final state
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        self.get_job(job_id).await
    }

    /// Fail jobs left PENDING or PROCESSING by a process that is gone
    ///
    /// Only orphaned jobs are touched: those driven by an earlier run of this
    /// instance id, or by an instance whose driver lease has lapsed. Jobs
    /// another live instance is driving are left alone.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let mut recovered = 0;
        for job in self.jobs.orphaned(Some(&self.config.instance_id)).await? {
            if self.lock_watchers().contains_key(&job.id) {
                continue;
            }
            let transition =
                JobTransition::Fail { error_detail: INTERRUPTED_ERROR_DETAIL.to_string() };
            match self.jobs.transition(&job.id, transition).await {
                Ok(_) => recovered += 1,
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Failed to recover job"),
            }
        }

        if recovered > 0 {
            tracing::info!(recovered, "Failed jobs interrupted by restart");
        }
        Ok(recovered)
    }

    /// Delete terminal jobs older than `retention`
    pub async fn purge_expired_jobs(&self, retention: Duration) -> Result<usize> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| Error::internal(format!("Invalid retention period: {e}")))?;
        self.jobs.purge_terminal_before(Utc::now() - retention).await
    }

    async fn renew_driver_lease(&self) -> Result<()> {
        self.jobs
            .refresh_driver_lease(&self.config.instance_id, self.config.effective_lease_ttl())
            .await
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<JobStatus>>> {
        self.watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn supervise(self, job_id: String, parameters: JobParameters) {
        let driver = self.clone();
        let id = job_id.clone();
        let outcome = tokio::spawn(async move { driver.drive(&id, &parameters).await }).await;

        if let Err(join_error) = outcome {
            if join_error.is_panic() {
                tracing::error!(job_id = %job_id, "Job driver panicked");
            } else {
                tracing::warn!(job_id = %job_id, "Job driver was cancelled");
            }
            self.fail(&job_id, PANIC_ERROR_DETAIL).await;
        }

        self.lock_watchers().remove(&job_id);
        let active = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        crate::metrics::set_active_jobs(active);
    }

    async fn drive(&self, job_id: &str, parameters: &JobParameters) {
        let timeout = self.config.backend_call_timeout;

        let handle = match tokio::time::timeout(timeout, self.backend.submit(job_id, parameters)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                self.fail(job_id, &format!("Generation backend rejected the job: {}", e.message()))
                    .await;
                return;
            },
            Err(_) => {
                self.fail(job_id, "Generation backend did not accept the job in time").await;
                return;
            },
        };

        if self.advance(job_id, JobTransition::Start).await.is_none() {
            return;
        }

        let deadline = Instant::now() + self.config.max_runtime;
        let mut consecutive_errors = 0;

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Err(e) = self.renew_driver_lease().await {
                tracing::warn!(job_id, error = %e, "Failed to renew driver lease");
            }
            if Instant::now() >= deadline {
                self.fail(job_id, "Generation exceeded the maximum runtime").await;
                return;
            }

            let reason = match tokio::time::timeout(timeout, self.backend.poll_status(&handle)).await
            {
                Ok(Ok(BackendStatus::Running)) => {
                    consecutive_errors = 0;
                    continue;
                },
                Ok(Ok(BackendStatus::Succeeded { result_reference })) => {
                    self.advance(job_id, JobTransition::Complete { result_reference }).await;
                    return;
                },
                Ok(Ok(BackendStatus::Failed { reason })) => {
                    self.fail(job_id, &reason).await;
                    return;
                },
                Ok(Err(e)) => e.message().to_string(),
                Err(_) => "status request timed out".to_string(),
            };

            consecutive_errors += 1;
            tracing::warn!(
                job_id,
                consecutive_errors,
                reason = %redact_text(&reason),
                "Polling generation backend failed"
            );
            if consecutive_errors >= MAX_CONSECUTIVE_POLL_ERRORS {
                self.fail(job_id, &format!("Lost contact with generation backend: {reason}")).await;
                return;
            }
        }
    }

    async fn fail(&self, job_id: &str, detail: &str) {
        let error_detail = redact_text(detail);
        self.advance(job_id, JobTransition::Fail { error_detail }).await;
    }

    /// Persist a transition and publish the new status
    async fn advance(&self, job_id: &str, transition: JobTransition) -> Option<Job> {
        match self.jobs.transition(job_id, transition).await {
            Ok(job) => {
                if let Some(sender) = self.lock_watchers().get(job_id) {
                    sender.send_replace(job.status);
                }
                if job.is_terminal() {
                    let elapsed = (job.updated_at - job.created_at).num_milliseconds() as f64 / 1000.0;
                    crate::metrics::record_job_finished(&job.status.to_string(), elapsed);
                    match job.status {
                        JobStatus::Failed => tracing::warn!(
                            job_id,
                            error_detail = job.error_detail.as_deref().unwrap_or_default(),
                            "Job failed"
                        ),
                        _ => tracing::info!(job_id, "Job completed"),
                    }
                } else {
                    tracing::debug!(job_id, status = %job.status, "Job advanced");
                }
                Some(job)
            },
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Job transition rejected");
                None
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use bastion_control_storage::MemoryBackend;

    use super::*;
    use crate::faults::FaultInjector;

    fn params() -> JobParameters {
        JobParameters::builder()
            .prompt("a lighthouse in a storm")
            .duration_seconds(5)
            .style("cinematic")
            .aspect_ratio("16:9")
            .quality("standard")
            .build()
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig::builder()
            .poll_interval(Duration::from_millis(5))
            .max_runtime(Duration::from_secs(5))
            .backend_call_timeout(Duration::from_millis(500))
            .build()
    }

    fn orchestrator(backend: Arc<dyn GenerationBackend>) -> JobOrchestrator<MemoryBackend> {
        JobOrchestrator::new(MemoryBackend::new(), backend, fast_config())
    }

    struct PanickingBackend;

    #[async_trait]
    impl GenerationBackend for PanickingBackend {
        async fn submit(&self, _job_id: &str, _parameters: &JobParameters) -> Result<BackendHandle> {
            panic!("backend bug");
        }

        async fn poll_status(&self, _handle: &BackendHandle) -> Result<BackendStatus> {
            Ok(BackendStatus::Running)
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl GenerationBackend for FailingBackend {
        async fn submit(&self, job_id: &str, _parameters: &JobParameters) -> Result<BackendHandle> {
            Ok(BackendHandle {
                job_id: job_id.to_string(),
                external_id: "x".into(),
                submitted_at: Instant::now(),
            })
        }

        async fn poll_status(&self, _handle: &BackendHandle) -> Result<BackendStatus> {
            Ok(BackendStatus::Failed {
                reason: "content policy violation, token=abc123secret".into(),
            })
        }
    }

    #[tokio::test]
    async fn job_runs_to_completion() {
        let orchestrator =
            orchestrator(Arc::new(SimulatedBackend::new(Duration::from_millis(20), "https://cdn.test")));
        let job = orchestrator.create_job("user-1", params()).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let done = orchestrator.wait_for_terminal(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result_reference, Some(format!("https://cdn.test/{}.mp4", job.id)));
        assert!(done.error_detail.is_none());

        // terminal reads are stable
        assert_eq!(orchestrator.get_job(&job.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn invalid_parameters_never_create_a_job() {
        let orchestrator =
            orchestrator(Arc::new(SimulatedBackend::new(Duration::ZERO, "https://cdn.test")));
        let bad = JobParameters { prompt: "   short   ".into(), quality: "8k".into(), ..params() };

        let err = orchestrator.create_job("user-1", bad).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        let paths: Vec<_> = err.details().iter().map(|d| d.field_path.as_str()).collect();
        assert_eq!(paths, vec!["prompt", "quality"]);
        assert!(orchestrator.jobs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_recorded_redacted() {
        let orchestrator = orchestrator(Arc::new(FailingBackend));
        let job = orchestrator.create_job("user-1", params()).await.unwrap();

        let done = orchestrator.wait_for_terminal(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        let detail = done.error_detail.unwrap();
        assert!(detail.contains("content policy violation"));
        assert!(!detail.contains("abc123secret"));
    }

    #[tokio::test]
    async fn driver_panic_fails_the_job() {
        let orchestrator = orchestrator(Arc::new(PanickingBackend));
        let job = orchestrator.create_job("user-1", params()).await.unwrap();

        let done = orchestrator.wait_for_terminal(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error_detail.as_deref(), Some(PANIC_ERROR_DETAIL));
    }

    #[tokio::test]
    async fn repeated_poll_errors_fail_the_job() {
        let faults = FaultInjector::new(Duration::from_secs(60));
        let backend = FaultInjectingBackend::new(
            SimulatedBackend::new(Duration::from_secs(60), "https://cdn.test"),
            faults.clone(),
        );
        let orchestrator = orchestrator(Arc::new(backend));
        let job = orchestrator.create_job("user-1", params()).await.unwrap();

        // let submission through, then break every poll
        let mut status = orchestrator.subscribe(&job.id).await.unwrap();
        status.wait_for(|s| *s == JobStatus::Processing).await.unwrap();
        faults.inject_failure(GENERATION_SERVICE, "gpu pool exhausted", 1.0, None).await.unwrap();

        let done = orchestrator.wait_for_terminal(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_detail.unwrap().contains("gpu pool exhausted"));
    }

    #[tokio::test]
    async fn identical_requests_create_distinct_jobs() {
        let orchestrator =
            orchestrator(Arc::new(SimulatedBackend::new(Duration::from_secs(60), "https://cdn.test")));
        let a = orchestrator.create_job("user-1", params()).await.unwrap();
        let b = orchestrator.create_job("user-1", params()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(orchestrator.active_jobs(), 2);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let orchestrator =
            orchestrator(Arc::new(SimulatedBackend::new(Duration::ZERO, "https://cdn.test")));
        assert_eq!(orchestrator.get_job("job_missing").await.unwrap_err().error_code(), "NOT_FOUND");
        assert_eq!(orchestrator.subscribe("job_missing").await.unwrap_err().error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn interrupted_jobs_are_failed_on_recovery() {
        let storage = MemoryBackend::new();
        let stale = Job::new("user-1", params());
        JobRepository::new(storage.clone()).create(&stale).await.unwrap();

        let orchestrator = JobOrchestrator::new(
            storage,
            Arc::new(SimulatedBackend::new(Duration::ZERO, "https://cdn.test")),
            fast_config(),
        );
        assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 1);

        let job = orchestrator.get_job(&stale.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_detail.as_deref(), Some(INTERRUPTED_ERROR_DETAIL));
        assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recovery_leaves_jobs_of_live_instances_alone() {
        let storage = MemoryBackend::new();
        let backend: Arc<dyn GenerationBackend> =
            Arc::new(SimulatedBackend::new(Duration::from_millis(200), "https://cdn.test"));
        let config = |id: &str| OrchestratorConfig { instance_id: id.to_string(), ..fast_config() };

        let first = JobOrchestrator::new(storage.clone(), Arc::clone(&backend), config("control-a"));
        let job = first.create_job("user-1", params()).await.unwrap();

        // a second instance starts on the same storage while the job is in flight
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = JobOrchestrator::new(storage, backend, config("control-b"));
        assert_eq!(second.recover_interrupted().await.unwrap(), 0);

        let done = first.wait_for_terminal(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.error_detail.is_none());
        assert_eq!(done.driver_id.as_deref(), Some("control-a"));
    }

    #[tokio::test]
    async fn recovery_fails_jobs_of_a_lapsed_instance() {
        let storage = MemoryBackend::new();
        let abandoned = Job::new("user-1", params()).with_driver("control-a");
        let repo = JobRepository::new(storage.clone());
        repo.create(&abandoned).await.unwrap();
        repo.refresh_driver_lease("control-a", Duration::from_millis(10)).await.unwrap();

        let config = OrchestratorConfig { instance_id: "control-b".into(), ..fast_config() };
        let orchestrator = JobOrchestrator::new(
            storage,
            Arc::new(SimulatedBackend::new(Duration::ZERO, "https://cdn.test")),
            config,
        );
        assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 1);
        let job = orchestrator.get_job(&abandoned.id).await.unwrap();
        assert_eq!(job.error_detail.as_deref(), Some(INTERRUPTED_ERROR_DETAIL));
    }

    #[tokio::test]
    async fn recovery_fails_jobs_of_a_previous_run_under_the_same_id() {
        let storage = MemoryBackend::new();
        let repo = JobRepository::new(storage.clone());
        let stale = Job::new("user-1", params()).with_driver("control-a");
        repo.create(&stale).await.unwrap();
        repo.refresh_driver_lease("control-a", Duration::from_secs(30)).await.unwrap();

        let config = OrchestratorConfig { instance_id: "control-a".into(), ..fast_config() };
        let orchestrator = JobOrchestrator::new(
            storage,
            Arc::new(SimulatedBackend::new(Duration::ZERO, "https://cdn.test")),
            config,
        );
        assert_eq!(orchestrator.recover_interrupted().await.unwrap(), 1);
    }

    #[test]
    fn lease_outlasts_the_longest_renewal_gap() {
        let config = OrchestratorConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .backend_call_timeout(Duration::from_secs(20))
            .driver_lease_ttl(Duration::from_secs(30))
            .build();
        assert_eq!(config.effective_lease_ttl(), Duration::from_secs(60));
        assert_eq!(OrchestratorConfig::default().effective_lease_ttl(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn purge_keeps_recent_jobs() {
        let orchestrator =
            orchestrator(Arc::new(SimulatedBackend::new(Duration::ZERO, "https://cdn.test")));
        let job = orchestrator.create_job("user-1", params()).await.unwrap();
        orchestrator.wait_for_terminal(&job.id, Duration::from_secs(5)).await.unwrap();

        assert_eq!(orchestrator.purge_expired_jobs(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(orchestrator.purge_expired_jobs(Duration::ZERO).await.unwrap(), 1);
        assert!(orchestrator.get_job(&job.id).await.is_err());
    }
}
