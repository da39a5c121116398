//! Duration constants for credentials, jobs and coordination.

/// Validity window of an issued service credential in days.
///
/// The authority never auto-renews; services must re-issue before expiry.
pub const CREDENTIAL_VALIDITY_DAYS: i64 = 90;

/// Validity of the internal certificate authority in days (10 years).
pub const CA_VALIDITY_DAYS: i64 = 3650;

/// How long terminal jobs remain readable before garbage collection (24 hours).
pub const JOB_RETENTION_SECONDS: u64 = 24 * 60 * 60;

/// Interval between generation backend status polls, in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 1000;

/// Upper bound on a single job's generation time (10 minutes).
pub const JOB_MAX_RUNTIME_SECONDS: u64 = 10 * 60;

/// Upper bound on any single call into the generation backend, in milliseconds.
pub const BACKEND_CALL_TIMEOUT_MS: u64 = 5000;

/// Processing time of the simulated generation backend, in milliseconds.
pub const SIMULATED_GENERATION_MS: u64 = 30_000;

/// Default lifetime of an applied fault injection rule.
pub const DEFAULT_FAULT_WINDOW_SECONDS: u64 = 60;

/// Leader lease TTL in seconds.
pub const LEADER_LEASE_TTL_SECONDS: u64 = 30;

/// Leader lease renewal interval in seconds (renew before expiry).
pub const LEADER_RENEWAL_INTERVAL_SECONDS: u64 = 10;

/// Lower bound on the lease an orchestrator holds over the jobs it drives, in seconds.
///
/// Renewed on every job creation and every poll; a job whose driver lease has
/// lapsed is treated as orphaned.
pub const JOB_DRIVER_LEASE_TTL_SECONDS: u64 = 30;
