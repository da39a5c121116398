use bastion_control_const::{limits::MAX_CALLER_KEY_LENGTH, ratelimit::TIERS};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::validation::{FieldError, Validate, check_trimmed_min_len};

/// Body of `POST /control/v1/ratelimit/consume`
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(on(String, into))]
pub struct ConsumeRateLimitRequest {
    pub tier: String,
    /// Already-resolved caller key, e.g. `ip:203.0.113.5`
    pub caller_key: String,
}

impl Validate for ConsumeRateLimitRequest {
    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["tier", "callerKey"],
            "properties": {
                "tier": { "type": "string", "enum": TIERS },
                "callerKey": { "type": "string", "maxLength": MAX_CALLER_KEY_LENGTH }
            }
        })
    }

    fn check(payload: &Value, errors: &mut Vec<FieldError>) {
        check_trimmed_min_len(payload, "callerKey", 1, errors);
    }
}

/// Outcome of one `consume` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecisionResponse {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::validation::parse_validated;

    #[test]
    fn accepts_known_tier() {
        let req: ConsumeRateLimitRequest =
            parse_validated(json!({ "tier": "auth", "callerKey": "ip:10.0.0.1" })).unwrap();
        assert_eq!(req.tier, "auth");
        assert_eq!(req.caller_key, "ip:10.0.0.1");
    }

    #[test]
    fn rejects_unknown_tier_and_missing_caller() {
        let err = parse_validated::<ConsumeRateLimitRequest>(json!({ "tier": "bulk" })).unwrap_err();
        let paths: Vec<_> = err.details().iter().map(|d| d.field_path.as_str()).collect();
        assert_eq!(paths, vec!["tier", "callerKey"]);
    }
}
