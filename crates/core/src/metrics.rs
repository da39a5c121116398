use std::sync::{Once, OnceLock};

use bastion_control_types::error::{Error, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static METRICS_INIT: Once = Once::new();
static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Register metric names and descriptions
///
/// Safe to call more than once; only the first call has an effect.
pub fn init() {
    METRICS_INIT.call_once(|| {
        // Counter metrics
        describe_counter!("http_requests_total", "Total number of HTTP requests received");
        describe_counter!(
            "rate_limits_exceeded_total",
            "Total number of requests rejected by a rate-limit tier"
        );
        describe_counter!("jobs_created_total", "Total number of generation jobs accepted");
        describe_counter!("jobs_finished_total", "Total number of jobs that reached a terminal state");
        describe_counter!(
            "fault_injections_total",
            "Total number of fault injection requests, by kind and outcome"
        );
        describe_counter!(
            "faults_triggered_total",
            "Total number of requests degraded by an installed fault rule"
        );
        describe_counter!("credentials_issued_total", "Total number of mTLS credentials issued");
        describe_counter!("credentials_revoked_total", "Total number of mTLS credentials revoked");
        describe_counter!(
            "credential_verifications_total",
            "Total number of credential verifications, by result"
        );

        // Histogram metrics
        describe_histogram!("http_request_duration_seconds", "HTTP request duration in seconds");
        describe_histogram!("job_duration_seconds", "Time from job creation to terminal state");

        // Gauge metrics
        describe_gauge!("active_jobs", "Number of jobs currently driven by this instance");
        describe_gauge!("is_leader", "Whether this instance is the leader (1) or not (0)");
    });
}

/// Install the global Prometheus recorder and return its render handle
///
/// Repeated calls return the handle installed by the first one.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install metrics recorder: {e}")))?;
    let _ = PROMETHEUS.set(handle.clone());
    init();

    Ok(PROMETHEUS.get().cloned().unwrap_or(handle))
}

/// Handle of the installed Prometheus recorder, if any
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS.get().cloned()
}

/// Record an HTTP request completion
///
/// # Arguments
///
/// * `method` - HTTP method
/// * `path` - Matched route pattern, never the raw URI
/// * `status` - HTTP status code
/// * `duration_secs` - Request duration in seconds
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string(), "path" => path.to_string())
        .record(duration_secs);
}

/// Record a request rejected by a rate-limit tier
pub fn record_rate_limit_exceeded(tier: &str) {
    counter!("rate_limits_exceeded_total", "tier" => tier.to_string()).increment(1);
}

pub fn record_job_created() {
    counter!("jobs_created_total").increment(1);
}

/// Record a job reaching COMPLETED or FAILED
///
/// # Arguments
///
/// * `status` - Terminal status label
/// * `duration_secs` - Time since the job was created
pub fn record_job_finished(status: &str, duration_secs: f64) {
    counter!("jobs_finished_total", "status" => status.to_string()).increment(1);
    histogram!("job_duration_seconds", "status" => status.to_string()).record(duration_secs);
}

/// Set the number of jobs this instance is driving
pub fn set_active_jobs(count: usize) {
    gauge!("active_jobs").set(count as f64);
}

/// Record a fault injection request and whether its trial applied
pub fn record_fault_injection(kind: &str, applied: bool) {
    counter!("fault_injections_total", "kind" => kind.to_string(), "applied" => applied.to_string())
        .increment(1);
}

/// Record a request that an installed fault rule actually degraded
pub fn record_fault_triggered(service: &str, kind: &str) {
    counter!("faults_triggered_total", "service" => service.to_string(), "kind" => kind.to_string())
        .increment(1);
}

pub fn record_credential_issued() {
    counter!("credentials_issued_total").increment(1);
}

pub fn record_credentials_revoked(count: usize) {
    counter!("credentials_revoked_total").increment(count as u64);
}

/// Record a verification outcome (`valid`, `unknown`, `revoked`, `expired`, `mismatch`)
pub fn record_credential_verification(result: &str) {
    counter!("credential_verifications_total", "result" => result.to_string()).increment(1);
}

/// Set whether this instance is the leader
pub fn set_is_leader(is_leader: bool) {
    gauge!("is_leader").set(if is_leader { 1.0 } else { 0.0 });
}
