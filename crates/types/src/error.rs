use std::backtrace::Backtrace;

use snafu::Snafu;

use crate::validation::FieldError;

/// Result type alias for control-plane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to callers in place of any internal failure detail
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Error types for the Control API
///
/// Every caller-visible failure maps to exactly one code from a small taxonomy
/// (see [`Error::error_code`]). All variants include backtraces for debugging.
/// Use the constructor methods (e.g., `Error::validation("message")`) to create
/// errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Configuration errors
    #[snafu(display("Configuration error: {message}"))]
    Config { message: String, backtrace: Backtrace },

    /// Storage errors
    #[snafu(display("Storage error: {message}"))]
    Storage { message: String, backtrace: Backtrace },

    /// Input failed schema or domain validation
    #[snafu(display("Validation error: {message}"))]
    Validation { message: String, details: Vec<FieldError>, backtrace: Backtrace },

    /// Caller exhausted a rate-limit tier
    #[snafu(display("Rate limit exceeded: {message}"))]
    RateLimited { message: String, retry_after_secs: u64, backtrace: Backtrace },

    /// Identity or credential could not be established
    #[snafu(display("Unauthorized: {message}"))]
    Unauthorized { message: String, backtrace: Backtrace },

    /// Identity established but not permitted
    #[snafu(display("Forbidden: {message}"))]
    Forbidden { message: String, backtrace: Backtrace },

    /// Resource not found
    #[snafu(display("Resource not found: {message}"))]
    NotFound { message: String, backtrace: Backtrace },

    /// Resource conflicts with existing state
    #[snafu(display("Conflict: {message}"))]
    Conflict { message: String, backtrace: Backtrace },

    /// Service deliberately degraded by an injected failure
    #[snafu(display("Service unavailable: {message}"))]
    Unavailable { message: String, backtrace: Backtrace },

    /// External service errors
    #[snafu(display("External service error: {message}"))]
    External { message: String, backtrace: Backtrace },

    /// Internal system errors
    #[snafu(display("Internal error: {message}"))]
    Internal { message: String, backtrace: Backtrace },
}

impl Error {
    // =========================================================================
    // Constructors - maintain API compatibility while capturing backtraces
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ConfigSnafu { message: message.into() }.build()
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        StorageSnafu { message: message.into() }.build()
    }

    /// Create a validation error without field details
    pub fn validation(message: impl Into<String>) -> Self {
        ValidationSnafu { message: message.into(), details: Vec::new() }.build()
    }

    /// Create a validation error carrying per-field details
    pub fn validation_details(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        ValidationSnafu { message: message.into(), details }.build()
    }

    /// Create a validation error for a single field
    pub fn invalid_field(
        field_path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::validation_details(
            "Validation failed",
            vec![FieldError::new(field_path, message, code)],
        )
    }

    /// Create a rate limit error
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        RateLimitedSnafu { message: message.into(), retry_after_secs }.build()
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        UnauthorizedSnafu { message: message.into() }.build()
    }

    /// Create a forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        ForbiddenSnafu { message: message.into() }.build()
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        NotFoundSnafu { message: message.into() }.build()
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        ConflictSnafu { message: message.into() }.build()
    }

    /// Create an injected-unavailability error
    pub fn unavailable(message: impl Into<String>) -> Self {
        UnavailableSnafu { message: message.into() }.build()
    }

    /// Create an external service error
    pub fn external(message: impl Into<String>) -> Self {
        ExternalSnafu { message: message.into() }.build()
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        InternalSnafu { message: message.into() }.build()
    }

    // =========================================================================
    // Metadata accessors
    // =========================================================================

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 500,
            Error::Storage { .. } => 500,
            Error::Validation { .. } => 400,
            Error::RateLimited { .. } => 429,
            Error::Unauthorized { .. } => 401,
            Error::Forbidden { .. } => 403,
            Error::NotFound { .. } => 404,
            Error::Conflict { .. } => 409,
            Error::Unavailable { .. } => 503,
            Error::External { .. } => 502,
            Error::Internal { .. } => 500,
        }
    }

    /// Get error code for client consumption
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::Unauthorized { .. } => "UNAUTHORIZED",
            Error::Forbidden { .. } => "FORBIDDEN",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Conflict { .. } => "CONFLICT",
            Error::Config { .. }
            | Error::Storage { .. }
            | Error::Unavailable { .. }
            | Error::External { .. }
            | Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether the error belongs to the internal class whose message is
    /// withheld from callers in production.
    ///
    /// Injected failures are excluded: their message is chosen by the operator.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::Storage { .. }
                | Error::External { .. }
                | Error::Internal { .. }
        )
    }

    /// The bare message without the display prefix
    pub fn message(&self) -> &str {
        match self {
            Error::Config { message, .. }
            | Error::Storage { message, .. }
            | Error::Validation { message, .. }
            | Error::RateLimited { message, .. }
            | Error::Unauthorized { message, .. }
            | Error::Forbidden { message, .. }
            | Error::NotFound { message, .. }
            | Error::Conflict { message, .. }
            | Error::Unavailable { message, .. }
            | Error::External { message, .. }
            | Error::Internal { message, .. } => message,
        }
    }

    /// Field-level details for validation errors
    pub fn details(&self) -> &[FieldError] {
        match self {
            Error::Validation { details, .. } => details,
            _ => &[],
        }
    }

    /// Seconds the caller should wait before retrying, for rate limit errors
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
