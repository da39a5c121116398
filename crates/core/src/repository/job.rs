use std::{collections::HashMap, time::Duration};

use bastion_control_const::ratelimit::MAX_CAS_ATTEMPTS;
use bastion_control_storage::{StorageBackend, StorageError, prefix_end};
use bastion_control_types::{
    entities::{Job, JobTransition},
    error::{Error, Result},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};

const JOB_PREFIX: &[u8] = b"job:";
const DRIVER_LEASE_PREFIX: &str = "job_driver:";

/// Repository for generation jobs
///
/// Key schema:
/// - job:{job_id} -> Job data
/// - job_driver:{instance_id} -> lease (TTL) of the orchestrator driving jobs
///
/// Every write after creation is a compare-and-set against the bytes that were
/// read, so two writers racing on one job never both win.
pub struct JobRepository<S: StorageBackend> {
    storage: S,
}

impl<S: StorageBackend> JobRepository<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    fn job_key(id: &str) -> Vec<u8> {
        format!("job:{id}").into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<Job> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::internal(format!("Failed to deserialize job: {e}")))
    }

    /// Persist a new job; an existing id is a conflict
    pub async fn create(&self, job: &Job) -> Result<()> {
        let data = serde_json::to_vec(job)
            .map_err(|e| Error::internal(format!("Failed to serialize job: {e}")))?;

        match self.storage.compare_and_set(&Self::job_key(&job.id), None, data).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict { .. }) => {
                Err(Error::conflict(format!("Job {} already exists", job.id)))
            },
            Err(e) => Err(Error::internal(format!("Failed to create job: {e}"))),
        }
    }

    async fn get_raw(&self, id: &str) -> Result<Option<Bytes>> {
        self.storage
            .get(&Self::job_key(id))
            .await
            .map_err(|e| Error::internal(format!("Failed to get job: {e}")))
    }

    /// Get a job by ID
    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        self.get_raw(id).await?.map(|bytes| Self::decode(&bytes)).transpose()
    }

    /// Apply a lifecycle transition and persist it
    ///
    /// Returns the updated job. Disallowed transitions (including anything out
    /// of a terminal state) are conflicts and leave storage untouched.
    pub async fn transition(&self, id: &str, transition: JobTransition) -> Result<Job> {
        let key = Self::job_key(id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .get_raw(id)
                .await?
                .ok_or_else(|| Error::not_found(format!("Job {id} not found")))?;

            let mut job = Self::decode(&current)?;
            job.transition_to(transition.clone())?;

            let data = serde_json::to_vec(&job)
                .map_err(|e| Error::internal(format!("Failed to serialize job: {e}")))?;

            match self.storage.compare_and_set(&key, Some(current.as_ref()), data).await {
                Ok(()) => return Ok(job),
                Err(StorageError::Conflict { .. }) => continue,
                Err(e) => return Err(Error::internal(format!("Failed to update job: {e}"))),
            }
        }

        Err(Error::conflict(format!("Job {id} was modified concurrently")))
    }

    /// All stored jobs, ordered by id
    pub async fn list(&self) -> Result<Vec<Job>> {
        let kvs = self
            .storage
            .get_range(JOB_PREFIX.to_vec()..prefix_end(JOB_PREFIX))
            .await
            .map_err(|e| Error::internal(format!("Failed to list jobs: {e}")))?;

        let mut jobs = Vec::with_capacity(kvs.len());
        for kv in kvs {
            match Self::decode(&kv.value) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(key = %String::from_utf8_lossy(&kv.key), error = %e, "Skipping unreadable job record");
                },
            }
        }
        Ok(jobs)
    }

    /// Extend the lease showing `instance_id` is still driving its jobs
    pub async fn refresh_driver_lease(&self, instance_id: &str, ttl: Duration) -> Result<()> {
        let key = format!("{DRIVER_LEASE_PREFIX}{instance_id}").into_bytes();
        self.storage
            .set_with_ttl(key, instance_id.as_bytes().to_vec(), ttl)
            .await
            .map_err(|e| Error::internal(format!("Failed to refresh driver lease: {e}")))
    }

    /// Whether `instance_id` holds an unexpired driver lease
    pub async fn driver_lease_live(&self, instance_id: &str) -> Result<bool> {
        let key = format!("{DRIVER_LEASE_PREFIX}{instance_id}").into_bytes();
        self.storage
            .get(&key)
            .await
            .map(|lease| lease.is_some())
            .map_err(|e| Error::internal(format!("Failed to read driver lease: {e}")))
    }

    /// Non-terminal jobs no live orchestrator is driving
    ///
    /// A job is orphaned when it has no recorded driver, when its driver's
    /// lease has lapsed, or when its driver is `restarted_instance` (a previous
    /// run of the caller under the same instance id).
    pub async fn orphaned(&self, restarted_instance: Option<&str>) -> Result<Vec<Job>> {
        let mut leases: HashMap<String, bool> = HashMap::new();
        let mut orphaned = Vec::new();

        for job in self.list().await? {
            if job.is_terminal() {
                continue;
            }
            let abandoned = match job.driver_id.as_deref() {
                None => true,
                Some(driver) if Some(driver) == restarted_instance => true,
                Some(driver) => match leases.get(driver) {
                    Some(live) => !live,
                    None => {
                        let live = self.driver_lease_live(driver).await?;
                        leases.insert(driver.to_string(), live);
                        !live
                    },
                },
            };
            if abandoned {
                orphaned.push(job);
            }
        }
        Ok(orphaned)
    }

    /// Delete terminal jobs last updated before `cutoff`
    ///
    /// Returns the number of jobs removed. Jobs still in flight are never
    /// touched regardless of age.
    pub async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for job in self.list().await? {
            if job.is_terminal() && job.updated_at < cutoff {
                self.storage
                    .delete(&Self::job_key(&job.id))
                    .await
                    .map_err(|e| Error::internal(format!("Failed to delete job: {e}")))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
