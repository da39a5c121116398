//! Probabilistic fault injection for resilience testing.
//!
//! An injection request runs one Bernoulli trial. When it succeeds a
//! [`FaultRule`] is installed for a bounded window and every subsequent request
//! to the target service runs its own independent trial against that rule.
//! Rules live only in this process's memory.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bastion_control_const::limits::{MAX_FAULT_LATENCY_MS, MAX_FAULT_MESSAGE_LENGTH};
use bastion_control_types::{
    entities::{FaultKind, FaultMagnitude, FaultRule},
    error::{Error, Result},
    validation::{codes, validate_service_name},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::RwLock;

/// Result of one injection request
///
/// The request itself always succeeds; `applied` reports whether the trial
/// triggered and a rule was installed.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionOutcome {
    pub applied: bool,
    pub message: String,
    /// End of the installed rule's window, when applied
    pub expires_at: Option<DateTime<Utc>>,
}

/// Independent Bernoulli trial drawn from the thread-local, OS-seeded generator
fn trial(probability: f64) -> bool {
    rand::rng().random::<f64>() < probability
}

fn percent(probability: f64) -> f64 {
    (probability * 10_000.0).round() / 100.0
}

fn validate_probability(probability: f64) -> Result<()> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(())
    } else {
        Err(Error::invalid_field(
            "probability",
            codes::TOO_BIG,
            "probability must be between 0 and 1",
        ))
    }
}

/// In-memory registry of fault rules keyed by `(service, kind)`
#[derive(Clone)]
pub struct FaultInjector {
    rules: Arc<RwLock<HashMap<(String, FaultKind), FaultRule>>>,
    default_window: Duration,
}

impl FaultInjector {
    pub fn new(default_window: Duration) -> Self {
        Self { rules: Arc::new(RwLock::new(HashMap::new())), default_window }
    }

    /// Request latency injection into `target`
    pub async fn inject_latency(
        &self,
        target: &str,
        duration_ms: u64,
        probability: f64,
        window: Option<Duration>,
    ) -> Result<InjectionOutcome> {
        validate_service_name("targetService", target)?;
        validate_probability(probability)?;
        if duration_ms == 0 || duration_ms > MAX_FAULT_LATENCY_MS as u64 {
            return Err(Error::invalid_field(
                "durationMs",
                codes::TOO_BIG,
                format!("durationMs must be between 1 and {MAX_FAULT_LATENCY_MS}"),
            ));
        }

        let magnitude = FaultMagnitude::Latency { duration_ms };
        let outcome = if trial(probability) {
            let expires_at = self.install(target, magnitude, probability, window).await;
            InjectionOutcome {
                applied: true,
                message: format!(
                    "Simulated injection of {duration_ms}ms latency into {target} with {}% probability.",
                    percent(probability)
                ),
                expires_at: Some(expires_at),
            }
        } else {
            Self::not_applied(FaultKind::Latency, target)
        };

        crate::metrics::record_fault_injection("LATENCY", outcome.applied);
        tracing::info!(service = target, applied = outcome.applied, "Latency injection requested");
        Ok(outcome)
    }

    /// Request failure injection into `target`
    pub async fn inject_failure(
        &self,
        target: &str,
        message: &str,
        probability: f64,
        window: Option<Duration>,
    ) -> Result<InjectionOutcome> {
        validate_service_name("targetService", target)?;
        validate_probability(probability)?;
        let length = message.chars().count();
        if length == 0 || length > MAX_FAULT_MESSAGE_LENGTH {
            return Err(Error::invalid_field(
                "message",
                codes::TOO_BIG,
                format!("message must be between 1 and {MAX_FAULT_MESSAGE_LENGTH} characters"),
            ));
        }

        let magnitude = FaultMagnitude::Failure { message: message.to_string() };
        let outcome = if trial(probability) {
            let expires_at = self.install(target, magnitude, probability, window).await;
            InjectionOutcome {
                applied: true,
                message: format!(
                    "Simulated injection of failure into {target} with message: \"{message}\""
                ),
                expires_at: Some(expires_at),
            }
        } else {
            Self::not_applied(FaultKind::Failure, target)
        };

        crate::metrics::record_fault_injection("FAILURE", outcome.applied);
        tracing::info!(service = target, applied = outcome.applied, "Failure injection requested");
        Ok(outcome)
    }

    fn not_applied(kind: FaultKind, target: &str) -> InjectionOutcome {
        let label = match kind {
            FaultKind::Latency => "Latency",
            FaultKind::Failure => "Failure",
        };
        InjectionOutcome {
            applied: false,
            message: format!(
                "{label} injection request received for {target}, but not executed (below probability threshold)."
            ),
            expires_at: None,
        }
    }

    async fn install(
        &self,
        target: &str,
        magnitude: FaultMagnitude,
        probability: f64,
        window: Option<Duration>,
    ) -> DateTime<Utc> {
        let now = Utc::now();
        let window = window.unwrap_or(self.default_window);
        let expires_at = now
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));

        let rule = FaultRule {
            target_service: target.to_string(),
            magnitude,
            probability,
            installed_at: now,
            expires_at,
        };

        self.rules.write().await.insert((target.to_string(), rule.kind()), rule);
        expires_at
    }

    /// Degrade one request to `service` according to its live rules
    ///
    /// Latency rules sleep, failure rules return an `Unavailable` error. Each
    /// rule runs its own trial.
    pub async fn apply(&self, service: &str) -> Result<()> {
        let now = Utc::now();
        let (latency, failure) = {
            let rules = self.rules.read().await;
            let live = |kind: FaultKind| {
                rules
                    .get(&(service.to_string(), kind))
                    .filter(|rule: &&FaultRule| rule.is_live_at(now))
                    .cloned()
            };
            (live(FaultKind::Latency), live(FaultKind::Failure))
        };

        if let Some(rule) = latency
            && let FaultMagnitude::Latency { duration_ms } = rule.magnitude
            && trial(rule.probability)
        {
            tracing::debug!(service, duration_ms, "Injecting latency");
            crate::metrics::record_fault_triggered(service, "LATENCY");
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        if let Some(rule) = failure
            && let FaultMagnitude::Failure { message } = rule.magnitude
            && trial(rule.probability)
        {
            tracing::debug!(service, "Injecting failure");
            crate::metrics::record_fault_triggered(service, "FAILURE");
            return Err(Error::unavailable(message));
        }

        Ok(())
    }

    /// Live rules ordered by service then kind; expired rules are dropped
    pub async fn list(&self) -> Vec<FaultRule> {
        let now = Utc::now();
        let mut rules = self.rules.write().await;
        rules.retain(|_, rule| rule.is_live_at(now));

        let mut live: Vec<FaultRule> = rules.values().cloned().collect();
        live.sort_by(|a, b| {
            a.target_service
                .cmp(&b.target_service)
                .then_with(|| a.kind().to_string().cmp(&b.kind().to_string()))
        });
        live
    }

    /// Remove every rule, returning how many were removed
    pub async fn clear(&self) -> usize {
        let mut rules = self.rules.write().await;
        let removed = rules.len();
        rules.clear();
        tracing::info!(removed, "Cleared all fault rules");
        removed
    }

    /// Remove the rules of one service
    pub async fn clear_service(&self, service: &str) -> usize {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|(target, _), _| target != service);
        let removed = before - rules.len();
        tracing::info!(service, removed, "Cleared fault rules for service");
        removed
    }
}
