#![deny(unsafe_code)]

//! # Bastion Control Core
//!
//! Domain logic of the Bastion control plane: tiered rate limiting, the
//! generation job orchestrator, probabilistic fault injection and the
//! internal credential authority, plus the leader-gated maintenance that
//! keeps storage tidy.
//!
//! ## Imports
//!
//! Import types from their source crates:
//! - Entity types: `bastion_control_types::entities`
//! - DTOs: `bastion_control_types::dto`
//! - Errors: `bastion_control_types::Error`
//! - Config: `bastion_control_config::Config`

pub mod background;
pub mod credentials;
pub mod crypto;
pub mod faults;
pub mod leader;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod ratelimit;
pub mod repository;

pub use background::BackgroundJobs;
pub use credentials::{
    CredentialAuthority, CredentialAuthorityConfig, IssuedCredential, RevocationOutcome,
    certificate_fingerprint,
};
pub use crypto::{MasterKey, SecretEncryptor};
pub use faults::{FaultInjector, InjectionOutcome};
pub use leader::LeaderElection;
pub use orchestrator::{
    BackendHandle, BackendStatus, FaultInjectingBackend, GenerationBackend, JobOrchestrator,
    OrchestratorConfig, SimulatedBackend,
};
pub use ratelimit::{RateLimitDecision, RateLimiter, rejection_message};
pub use repository::{CredentialRepository, JobRepository};
