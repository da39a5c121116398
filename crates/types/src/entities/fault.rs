use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of injected fault
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    Latency,
    Failure,
}

/// What an applied fault does to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultMagnitude {
    /// Delay the request
    Latency { duration_ms: u64 },
    /// Fail the request with an operator-chosen message
    Failure { message: String },
}

impl FaultMagnitude {
    pub fn kind(&self) -> FaultKind {
        match self {
            FaultMagnitude::Latency { .. } => FaultKind::Latency,
            FaultMagnitude::Failure { .. } => FaultKind::Failure,
        }
    }
}

/// An installed fault injection rule
///
/// Identified by `(target_service, kind)`. Rules live only in memory and
/// stop applying at `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRule {
    pub target_service: String,
    pub magnitude: FaultMagnitude,
    /// Per-request trigger probability in `[0, 1]`
    pub probability: f64,
    pub installed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FaultRule {
    pub fn kind(&self) -> FaultKind {
        self.magnitude.kind()
    }

    /// Whether the rule still applies at `now`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn magnitude_determines_kind() {
        assert_eq!(FaultMagnitude::Latency { duration_ms: 5 }.kind(), FaultKind::Latency);
        assert_eq!(
            FaultMagnitude::Failure { message: "down".into() }.kind(),
            FaultKind::Failure
        );
        assert_eq!(FaultKind::Latency.to_string(), "LATENCY");
    }

    #[test]
    fn rule_expires() {
        let now = Utc::now();
        let rule = FaultRule {
            target_service: "jobs".into(),
            magnitude: FaultMagnitude::Latency { duration_ms: 10 },
            probability: 1.0,
            installed_at: now,
            expires_at: now + Duration::seconds(60),
        };
        assert!(rule.is_live_at(now));
        assert!(!rule.is_live_at(now + Duration::seconds(60)));
    }
}
