use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bastion_control_const::ratelimit as tiers;
use bastion_control_core::{RateLimitDecision, rejection_message};
use bastion_control_types::{CallerKey, ErrorResponse};
use chrono::Utc;

use crate::{
    error::{ApiError, envelope_response},
    extract::resolve_caller,
    handlers::AppState,
};

/// Convert a display-able value to a HeaderValue.
///
/// Integer `.to_string()` output is always valid ASCII, so the fallback is
/// never hit in practice. This avoids `.unwrap()` on infallible conversions.
fn header_value(value: impl std::fmt::Display) -> HeaderValue {
    HeaderValue::try_from(value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Set the quota headers unless a more specific tier already did
fn set_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision, reset_after: u64) {
    headers.entry("X-RateLimit-Limit").or_insert_with(|| header_value(decision.limit));
    headers.entry("X-RateLimit-Remaining").or_insert_with(|| header_value(decision.remaining));
    headers.entry("X-RateLimit-Reset").or_insert_with(|| header_value(reset_after));
}

/// Consume one point on `tier` for the request's caller
///
/// Allowed requests get `X-RateLimit-*` headers; rejected ones short-circuit
/// with 429, the back-off details and `Retry-After`.
async fn enforce_tier(state: &AppState, tier: &'static str, req: Request, next: Next) -> Response {
    let caller = match req.extensions().get::<CallerKey>() {
        Some(caller) => caller.clone(),
        None => resolve_caller(&req),
    };
    // API-key callers get their own quota in place of the general one
    let tier = if tier == tiers::GENERAL && caller.is_api_key() { tiers::API_KEY } else { tier };

    let decision = match state.rate_limiter.consume(tier, &caller.to_string()).await {
        Ok(decision) => decision,
        Err(e) => return ApiError(e).into_response(),
    };
    let reset_after = decision.reset_after_secs(Utc::now());

    if decision.allowed {
        let mut response = next.run(req).await;
        set_quota_headers(response.headers_mut(), &decision, reset_after);
        return response;
    }

    tracing::info!(tier, caller = %caller, "Rate limit exceeded");

    let details = match serde_json::to_value(decision.details()) {
        Ok(details) => details,
        Err(e) => return ApiError(bastion_control_types::Error::internal(e.to_string())).into_response(),
    };
    let mut response = envelope_response(
        StatusCode::TOO_MANY_REQUESTS,
        ErrorResponse::new("RATE_LIMITED", rejection_message(tier)).with_details(details),
    );

    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, header_value(decision.retry_after_secs.unwrap_or(1)));
    set_quota_headers(headers, &decision, reset_after);
    response
}

/// `general` tier (or `api_key` for API-key callers) on every control route
pub async fn general_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce_tier(&state, tiers::GENERAL, req, next).await
}

/// `auth` tier on credential routes
pub async fn auth_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce_tier(&state, tiers::AUTH, req, next).await
}

/// `upload` tier on job creation
pub async fn upload_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce_tier(&state, tiers::UPLOAD, req, next).await
}
