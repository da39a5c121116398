use bastion_control_const::limits::{
    ASPECT_RATIOS, DEFAULT_GENERATION_SECONDS, GENERATION_STYLES, MAX_GENERATION_SECONDS,
    MAX_OWNER_ID_LENGTH, MAX_PROMPT_LENGTH, MIN_GENERATION_SECONDS, MIN_PROMPT_LENGTH,
    QUALITY_LEVELS,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    entities::{Job, JobParameters, JobStatus},
    validation::{FieldError, Validate, check_trimmed_min_len},
};

/// Body of `POST /control/v1/jobs`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct CreateJobRequest {
    pub owner_id: String,
    pub prompt: String,
    pub duration_seconds: Option<i64>,
    pub style: Option<String>,
    pub aspect_ratio: Option<String>,
    pub quality: Option<String>,
}

impl Validate for CreateJobRequest {
    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["ownerId", "prompt"],
            "properties": {
                "ownerId": { "type": "string", "maxLength": MAX_OWNER_ID_LENGTH },
                "prompt": { "type": "string", "maxLength": MAX_PROMPT_LENGTH },
                "durationSeconds": {
                    "type": "integer",
                    "minimum": MIN_GENERATION_SECONDS,
                    "maximum": MAX_GENERATION_SECONDS
                },
                "style": { "type": "string", "enum": GENERATION_STYLES },
                "aspectRatio": { "type": "string", "enum": ASPECT_RATIOS },
                "quality": { "type": "string", "enum": QUALITY_LEVELS }
            }
        })
    }

    fn check(payload: &Value, errors: &mut Vec<FieldError>) {
        check_trimmed_min_len(payload, "ownerId", 1, errors);
        check_trimmed_min_len(payload, "prompt", MIN_PROMPT_LENGTH, errors);
    }
}

impl CreateJobRequest {
    /// Normalized parameters with defaults applied and the prompt trimmed
    pub fn parameters(&self) -> JobParameters {
        fn or_default(value: &Option<String>, allowed: &[&str]) -> String {
            value.clone().unwrap_or_else(|| allowed.first().copied().unwrap_or_default().to_string())
        }

        JobParameters {
            prompt: self.prompt.trim().to_string(),
            duration_seconds: self.duration_seconds.unwrap_or(DEFAULT_GENERATION_SECONDS),
            style: or_default(&self.style, GENERATION_STYLES),
            aspect_ratio: or_default(&self.aspect_ratio, ASPECT_RATIOS),
            quality: or_default(&self.quality, QUALITY_LEVELS),
        }
    }
}

/// Acknowledgement returned with 202 Accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for CreateJobResponse {
    fn from(job: &Job) -> Self {
        Self { job_id: job.id.clone(), status: job.status, created_at: job.created_at }
    }
}

/// Current view of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub parameters: JobParameters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            owner_id: job.owner_id,
            status: job.status,
            parameters: job.parameters,
            created_at: job.created_at,
            updated_at: job.updated_at,
            result_reference: job.result_reference,
            error_detail: job.error_detail,
        }
    }
}
