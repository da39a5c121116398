//! # Bastion Control Types
//!
//! Shared type definitions for Bastion Control.
//!
//! This crate is the single source of truth for the error taxonomy, the
//! domain entities persisted by the control plane, the request/response
//! shapes of the HTTP surface, declarative request validation and the
//! redaction applied to everything that leaves the service.
//!
//! ## Builder Patterns
//!
//! Request types derive [`bon::Builder`] so tests and internal callers can
//! construct them without JSON:
//!
//! ```ignore
//! use bastion_control_types::dto::IssueCredentialRequest;
//!
//! let req = IssueCredentialRequest::builder()
//!     .service_name("feed")
//!     .common_name("feed-1.internal")
//!     .build();
//! ```

#![deny(unsafe_code)]

// ============================================================================
// Error Types
// ============================================================================

pub mod error;

pub use error::{Error, INTERNAL_ERROR_MESSAGE, Result};

// ============================================================================
// Caller Identity
// ============================================================================

pub mod identity;

pub use identity::CallerKey;

// ============================================================================
// Validation & Redaction
// ============================================================================

pub mod redact;
pub mod validation;

pub use redact::{REDACTED, is_sensitive_key, redact_text, redact_value};
pub use validation::{FieldError, Validate, parse_validated};

// ============================================================================
// Entity Types
// ============================================================================

pub mod entities;

pub use entities::{
    CertificateAuthorityRecord, Credential, FaultKind, FaultMagnitude, FaultRule, Job,
    JobParameters, JobStatus, JobTransition, RateLimit, RateLimitBucket, RateLimitTable,
    RevocationRecord,
};

// ============================================================================
// Request/Response Types
// ============================================================================

pub mod dto;

pub use dto::{
    CaCertificateResponse, ClearFaultsResponse, ConsumeRateLimitRequest, CreateJobRequest,
    CreateJobResponse, ErrorResponse, FaultRuleInfo, InjectFailureRequest, InjectLatencyRequest,
    InjectionResponse, IssueCredentialRequest, IssueCredentialResponse, JobResponse,
    ListFaultsResponse, RateLimitDecisionResponse, RateLimitDetails, RevocationEntry,
    RevocationListResponse, RevokeCredentialRequest, RevokeCredentialResponse,
    VerifyCredentialRequest, VerifyCredentialResponse,
};
