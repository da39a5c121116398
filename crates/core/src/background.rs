use std::{sync::Arc, time::Duration};

use bastion_control_const::duration::JOB_RETENTION_SECONDS;
use bastion_control_storage::StorageBackend;
use bastion_control_types::{
    entities::JobTransition,
    error::{Error, Result},
};
use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle, time};

use crate::{
    leader::LeaderElection, orchestrator::INTERRUPTED_ERROR_DETAIL, repository::JobRepository,
};

const HOURLY: Duration = Duration::from_secs(60 * 60);

/// Periodic maintenance that only the leader instance performs
///
/// # Jobs
///
/// - **job_retention_cleanup** (hourly): delete terminal generation jobs
///   older than the retention period
/// - **orphaned_job_recovery** (hourly): fail in-flight jobs whose driving
///   instance stopped renewing its driver lease
/// - **ratelimit_bucket_cleanup** (hourly): sweep storage entries whose TTL
///   has passed, which covers idle rate-limit buckets
///
/// Every tick checks leadership first; followers log and skip.
pub struct BackgroundJobs<S: StorageBackend> {
    storage: S,
    leader: Arc<LeaderElection<S>>,
    job_retention: Duration,
    interval: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: StorageBackend + Clone + Send + Sync + 'static> BackgroundJobs<S> {
    pub fn new(storage: S, leader: Arc<LeaderElection<S>>) -> Self {
        Self {
            storage,
            leader,
            job_retention: Duration::from_secs(JOB_RETENTION_SECONDS),
            interval: HOURLY,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// How long terminal jobs are kept
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    /// Tick period of every job (hourly unless overridden)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;

        let retention = self.job_retention;
        handles.push(self.spawn_periodic_job("job_retention_cleanup", move |storage| {
            Box::pin(async move { Self::cleanup_expired_jobs(storage, retention).await.map(|_| ()) })
        }));

        handles.push(self.spawn_periodic_job("orphaned_job_recovery", |storage| {
            Box::pin(async move { Self::recover_orphaned_jobs(storage).await.map(|_| ()) })
        }));

        handles.push(self.spawn_periodic_job("ratelimit_bucket_cleanup", |storage| {
            Box::pin(async move { Self::purge_expired_entries(storage).await.map(|_| ()) })
        }));

        tracing::info!(count = handles.len(), "Background jobs started");
    }

    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        tracing::info!("Background jobs stopped");
    }

    fn spawn_periodic_job<F, Fut>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let storage = self.storage.clone();
        let leader = Arc::clone(&self.leader);
        let period = self.interval;

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            // the first tick completes immediately; wait a full period instead
            interval.tick().await;

            loop {
                interval.tick().await;

                if !leader.is_leader() {
                    tracing::debug!(job = name, "Skipping job (not leader)");
                    continue;
                }

                tracing::info!(job = name, "Running background job");
                if let Err(e) = task(storage.clone()).await {
                    tracing::error!(job = name, error = %e, "Background job failed");
                }
            }
        })
    }

    /// Delete terminal jobs last updated more than `retention` ago
    pub async fn cleanup_expired_jobs(storage: S, retention: Duration) -> Result<usize> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| Error::internal(format!("Invalid retention period: {e}")))?;
        let removed =
            JobRepository::new(storage).purge_terminal_before(Utc::now() - retention).await?;

        tracing::info!(count = removed, "Cleaned up expired jobs");
        Ok(removed)
    }

    /// Fail non-terminal jobs that no live instance is driving
    pub async fn recover_orphaned_jobs(storage: S) -> Result<usize> {
        let jobs = JobRepository::new(storage);
        let mut recovered = 0;
        for job in jobs.orphaned(None).await? {
            let transition =
                JobTransition::Fail { error_detail: INTERRUPTED_ERROR_DETAIL.to_string() };
            match jobs.transition(&job.id, transition).await {
                Ok(_) => recovered += 1,
                // the driver finished it between the scan and the write
                Err(e) if e.error_code() == "CONFLICT" => {},
                Err(e) => return Err(e),
            }
        }

        tracing::info!(count = recovered, "Recovered orphaned jobs");
        Ok(recovered)
    }

    /// Drop storage entries whose TTL has passed
    ///
    /// Rate-limit buckets carry a TTL, so idle buckets disappear here.
    pub async fn purge_expired_entries(storage: S) -> Result<usize> {
        let removed = storage
            .purge_expired()
            .await
            .map_err(|e| Error::storage(format!("Failed to purge expired entries: {e}")))?;

        tracing::info!(count = removed, "Purged expired storage entries");
        Ok(removed)
    }
}
