use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix of every job identifier
const JOB_ID_PREFIX: &str = "job_";

/// Lifecycle state of a generation job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Generation request parameters, normalized with defaults applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct JobParameters {
    pub prompt: String,
    pub duration_seconds: i64,
    pub style: String,
    pub aspect_ratio: String,
    pub quality: String,
}

/// A requested lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// The generation backend accepted the work
    Start,
    /// The backend produced a result
    Complete { result_reference: String },
    /// The backend (or the orchestrator) gave up
    Fail { error_detail: String },
}

impl JobTransition {
    fn target(&self) -> JobStatus {
        match self {
            JobTransition::Start => JobStatus::Processing,
            JobTransition::Complete { .. } => JobStatus::Completed,
            JobTransition::Fail { .. } => JobStatus::Failed,
        }
    }
}

/// A long-running generation job
///
/// Jobs are only ever mutated through [`Job::transition_to`], which enforces
/// `PENDING -> PROCESSING -> COMPLETED | FAILED` (plus `PENDING -> FAILED`) and
/// keeps `result_reference` / `error_detail` consistent with the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    pub parameters: JobParameters,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Populated only when COMPLETED
    pub result_reference: Option<String>,
    /// Populated only when FAILED
    pub error_detail: Option<String>,
    /// Instance whose orchestrator drives this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
}

impl Job {
    /// Create a new PENDING job with a fresh identifier
    pub fn new(owner_id: impl Into<String>, parameters: JobParameters) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(),
            owner_id: owner_id.into(),
            parameters,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            result_reference: None,
            error_detail: None,
            driver_id: None,
        }
    }

    /// Record the instance that drives this job
    pub fn with_driver(mut self, instance_id: impl Into<String>) -> Self {
        self.driver_id = Some(instance_id.into());
        self
    }

    /// Generate an opaque job identifier (`job_` + 32 hex characters)
    pub fn generate_id() -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        format!("{JOB_ID_PREFIX}{}", hex::encode(bytes))
    }

    /// Whether a string has the shape of a job identifier
    pub fn is_valid_id(id: &str) -> bool {
        id.strip_prefix(JOB_ID_PREFIX)
            .is_some_and(|hex| hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
    }

    /// Whether the job reached COMPLETED or FAILED
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a lifecycle transition
    ///
    /// Returns a conflict error, leaving the job untouched, when the transition
    /// is not allowed from the current status.
    pub fn transition_to(&mut self, transition: JobTransition) -> Result<()> {
        let target = transition.target();
        let allowed = matches!(
            (self.status, target),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );

        if !allowed {
            return Err(Error::conflict(format!(
                "Job {} cannot transition from {} to {}",
                self.id, self.status, target
            )));
        }

        match transition {
            JobTransition::Start => {},
            JobTransition::Complete { result_reference } => {
                self.result_reference = Some(result_reference);
            },
            JobTransition::Fail { error_detail } => {
                self.error_detail = Some(error_detail);
            },
        }
        self.status = target;
        self.updated_at = Utc::now();

        Ok(())
    }
}
