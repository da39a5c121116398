//! # Bastion Control Constants
//!
//! Zero-dependency crate containing constants used across the Control codebase.
//!
//! This crate centralizes:
//! - Rate limit tier identifiers and their default quotas
//! - Duration constants (credential validity, job retention, leases)
//! - Input limits (prompt length, generation duration, fault magnitudes)

pub mod duration;
pub mod limits;
pub mod ratelimit;

// Re-export commonly used constants at crate root
pub use duration::{
    CA_VALIDITY_DAYS, CREDENTIAL_VALIDITY_DAYS, DEFAULT_FAULT_WINDOW_SECONDS,
    JOB_RETENTION_SECONDS,
};
pub use limits::{MAX_PROMPT_LENGTH, MIN_PROMPT_LENGTH, SERVICE_NAME_PATTERN};
