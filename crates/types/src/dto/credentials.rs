use bastion_control_const::limits::{
    COMMON_NAME_PATTERN, MAX_CERTIFICATE_PEM_LENGTH, MAX_COMMON_NAME_LENGTH, SERVICE_NAME_PATTERN,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    entities::RevocationRecord,
    validation::{FieldError, Validate, check_trimmed_min_len},
};

fn identity_schema() -> Value {
    json!({
        "type": "object",
        "required": ["serviceName", "commonName"],
        "properties": {
            "serviceName": { "type": "string", "pattern": SERVICE_NAME_PATTERN },
            "commonName": {
                "type": "string",
                "maxLength": MAX_COMMON_NAME_LENGTH,
                "pattern": COMMON_NAME_PATTERN
            }
        }
    })
}

/// Body of `POST /control/v1/credentials/issue`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct IssueCredentialRequest {
    pub service_name: String,
    pub common_name: String,
}

impl Validate for IssueCredentialRequest {
    fn schema() -> Value {
        identity_schema()
    }
}

/// Freshly issued credential material
///
/// This is the only time the private key leaves the service in clear form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialResponse {
    pub certificate: String,
    pub key: String,
    pub serial_number: String,
    pub ca_certificate: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /control/v1/credentials/revoke`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct RevokeCredentialRequest {
    pub service_name: String,
    pub common_name: String,
}

impl Validate for RevokeCredentialRequest {
    fn schema() -> Value {
        identity_schema()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeCredentialResponse {
    pub success: bool,
    pub message: String,
    pub revoked_serials: Vec<String>,
}

/// Body of `POST /control/v1/credentials/verify`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct VerifyCredentialRequest {
    pub service_name: String,
    pub common_name: String,
    /// PEM-encoded certificate presented by the peer
    pub certificate: String,
}

impl Validate for VerifyCredentialRequest {
    fn schema() -> Value {
        let mut schema = identity_schema();
        schema["required"] = json!(["serviceName", "commonName", "certificate"]);
        schema["properties"]["certificate"] =
            json!({ "type": "string", "maxLength": MAX_CERTIFICATE_PEM_LENGTH });
        schema
    }

    fn check(payload: &Value, errors: &mut Vec<FieldError>) {
        check_trimmed_min_len(payload, "certificate", 1, errors);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCredentialResponse {
    pub valid: bool,
    pub serial_number: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationEntry {
    pub serial_number: String,
    pub service_name: String,
    pub common_name: String,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<RevocationRecord> for RevocationEntry {
    fn from(record: RevocationRecord) -> Self {
        Self {
            serial_number: record.serial,
            service_name: record.service_name,
            common_name: record.common_name,
            revoked_at: record.revoked_at,
            expires_at: record.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationListResponse {
    pub revocations: Vec<RevocationEntry>,
}

/// Trust anchor for verifying issued certificates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaCertificateResponse {
    pub certificate: String,
    pub expires_at: DateTime<Utc>,
}
