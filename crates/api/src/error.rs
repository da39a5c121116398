//! Conversion of domain errors into the uniform JSON error envelope.
//!
//! Every failure leaves the service as `{success:false, code, message,
//! details?}`. Messages pass through the redactor first, and internal-class
//! messages are replaced by a generic one unless development mode is on.

use std::{
    any::Any,
    sync::atomic::{AtomicBool, Ordering},
};

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bastion_control_types::{
    Error, ErrorResponse, INTERNAL_ERROR_MESSAGE, redact_text, redact_value,
};
use serde_json::json;

static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Show internal error messages to callers (development mode only)
pub fn set_expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

fn expose_internal_errors() -> bool {
    EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed)
}

/// Handler error wrapping the domain [`Error`]
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Build the redacted envelope for `error`
pub fn error_envelope(error: &Error, expose_internal: bool) -> ErrorResponse {
    let message = if error.is_internal() && !expose_internal {
        INTERNAL_ERROR_MESSAGE.to_string()
    } else {
        redact_text(error.message())
    };

    let body = ErrorResponse::new(error.error_code(), message);
    if !error.details().is_empty() {
        match serde_json::to_value(error.details()) {
            Ok(mut details) => {
                redact_value(&mut details);
                body.with_details(details)
            },
            Err(_) => body,
        }
    } else if let Some(secs) = error.retry_after_secs() {
        body.with_details(json!({ "retryAfterSeconds": secs }))
    } else {
        body
    }
}

/// Serialize an envelope with the given status
pub fn envelope_response(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if error.is_internal() {
            tracing::error!(code = error.error_code(), error = %redact_text(&error.to_string()), "Request failed");
        } else {
            tracing::debug!(code = error.error_code(), error = %redact_text(&error.to_string()), "Request rejected");
        }

        let mut response = envelope_response(status, error_envelope(&error, expose_internal_errors()));
        if let Some(secs) = error.retry_after_secs()
            && let Ok(value) = HeaderValue::try_from(secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Convert a handler panic into the sanitized internal error envelope
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = %redact_text(detail), "Handler panicked");

    envelope_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse::new("INTERNAL_ERROR", INTERNAL_ERROR_MESSAGE),
    )
}

/// Fallback for paths no route matches
pub async fn route_not_found() -> Response {
    envelope_response(StatusCode::NOT_FOUND, ErrorResponse::new("NOT_FOUND", "Route not found"))
}

/// Fallback for a known path requested with the wrong method
pub async fn method_not_allowed() -> Response {
    envelope_response(
        StatusCode::METHOD_NOT_ALLOWED,
        ErrorResponse::new("NOT_FOUND", "Method not allowed for this route"),
    )
}
