use bastion_control_const::limits::{
    DEFAULT_FAULT_PROBABILITY, MAX_FAULT_LATENCY_MS, MAX_FAULT_MESSAGE_LENGTH,
    MAX_FAULT_WINDOW_SECONDS, SERVICE_NAME_PATTERN,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    entities::{FaultKind, FaultMagnitude, FaultRule},
    validation::{FieldError, Validate, check_trimmed_min_len},
};

/// Schema of an injection request carrying its magnitude in `magnitude_field`
fn injection_schema(magnitude_field: &str, magnitude: Value) -> Value {
    json!({
        "type": "object",
        "required": ["targetService", magnitude_field],
        "properties": {
            "targetService": { "type": "string", "pattern": SERVICE_NAME_PATTERN },
            magnitude_field: magnitude,
            "probability": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "windowSeconds": { "type": "integer", "minimum": 1, "maximum": MAX_FAULT_WINDOW_SECONDS }
        }
    })
}

/// Body of `POST /control/v1/faults/latency`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct InjectLatencyRequest {
    pub target_service: String,
    pub duration_ms: u64,
    /// Defaults to 0.5 when omitted
    pub probability: Option<f64>,
    pub window_seconds: Option<u64>,
}

impl Validate for InjectLatencyRequest {
    fn schema() -> Value {
        injection_schema(
            "durationMs",
            json!({ "type": "integer", "minimum": 1, "maximum": MAX_FAULT_LATENCY_MS }),
        )
    }
}

impl InjectLatencyRequest {
    pub fn probability(&self) -> f64 {
        self.probability.unwrap_or(DEFAULT_FAULT_PROBABILITY)
    }
}

/// Body of `POST /control/v1/faults/failure`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct InjectFailureRequest {
    pub target_service: String,
    pub message: String,
    /// Defaults to 0.5 when omitted
    pub probability: Option<f64>,
    pub window_seconds: Option<u64>,
}

impl Validate for InjectFailureRequest {
    fn schema() -> Value {
        injection_schema(
            "message",
            json!({ "type": "string", "maxLength": MAX_FAULT_MESSAGE_LENGTH }),
        )
    }

    fn check(payload: &Value, errors: &mut Vec<FieldError>) {
        check_trimmed_min_len(payload, "message", 1, errors);
    }
}

impl InjectFailureRequest {
    pub fn probability(&self) -> f64 {
        self.probability.unwrap_or(DEFAULT_FAULT_PROBABILITY)
    }
}

/// Two-level injection answer: the request was accepted, `applied` says
/// whether the trial triggered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionResponse {
    pub success: bool,
    pub applied: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A live fault rule as reported by `GET /control/v1/faults`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRuleInfo {
    pub target_service: String,
    pub kind: FaultKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub probability: f64,
    pub installed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<FaultRule> for FaultRuleInfo {
    fn from(rule: FaultRule) -> Self {
        let kind = rule.kind();
        let (duration_ms, message) = match rule.magnitude {
            FaultMagnitude::Latency { duration_ms } => (Some(duration_ms), None),
            FaultMagnitude::Failure { message } => (None, Some(message)),
        };
        Self {
            target_service: rule.target_service,
            kind,
            duration_ms,
            message,
            probability: rule.probability,
            installed_at: rule.installed_at,
            expires_at: rule.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFaultsResponse {
    pub faults: Vec<FaultRuleInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearFaultsResponse {
    pub success: bool,
    pub removed: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::validation::{codes, parse_validated};

    #[test]
    fn probability_defaults_to_half() {
        let req: InjectLatencyRequest =
            parse_validated(json!({ "targetService": "jobs", "durationMs": 250 })).unwrap();
        assert_eq!(req.probability(), 0.5);
        assert!(req.window_seconds.is_none());
    }

    #[test]
    fn explicit_zero_probability_is_kept() {
        let req: InjectFailureRequest = parse_validated(json!({
            "targetService": "jobs",
            "message": "db down",
            "probability": 0.0,
        }))
        .unwrap();
        assert_eq!(req.probability(), 0.0);
    }

    #[test]
    fn rejects_out_of_range_magnitudes() {
        let err = parse_validated::<InjectLatencyRequest>(json!({
            "targetService": "Jobs Service",
            "durationMs": 60_001,
            "probability": 1.5,
            "windowSeconds": 0,
        }))
        .unwrap_err();

        let found: Vec<_> =
            err.details().iter().map(|d| (d.field_path.as_str(), d.code.as_str())).collect();
        assert_eq!(
            found,
            vec![
                ("targetService", codes::INVALID_STRING),
                ("durationMs", codes::TOO_BIG),
                ("probability", codes::TOO_BIG),
                ("windowSeconds", codes::TOO_SMALL),
            ]
        );
    }

    #[test]
    fn failure_message_is_required() {
        let err = parse_validated::<InjectFailureRequest>(json!({ "targetService": "jobs", "message": "" }))
            .unwrap_err();
        assert_eq!(err.details()[0].field_path, "message");
        assert_eq!(err.details()[0].code, codes::TOO_SMALL);
    }

    #[test]
    fn rule_info_flattens_magnitude() {
        let now = Utc::now();
        let info = FaultRuleInfo::from(FaultRule {
            target_service: "jobs".into(),
            magnitude: FaultMagnitude::Failure { message: "down".into() },
            probability: 1.0,
            installed_at: now,
            expires_at: now,
        });
        let value = serde_json::to_value(info).unwrap();
        assert_eq!(value["kind"], "FAILURE");
        assert_eq!(value["message"], "down");
        assert!(value.get("durationMs").is_none());
    }
}
