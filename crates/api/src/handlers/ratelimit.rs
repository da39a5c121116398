use axum::{Json, extract::State};
use bastion_control_types::{ConsumeRateLimitRequest, RateLimitDecisionResponse};

use super::AppState;
use crate::{error::Result, extract::ValidatedJson};

/// Consume one point on behalf of an upstream service
///
/// POST /control/v1/ratelimit/consume
///
/// The decision is returned as data with 200 either way; the caller decides
/// how to surface a rejection.
pub async fn consume(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ConsumeRateLimitRequest>,
) -> Result<Json<RateLimitDecisionResponse>> {
    let decision = state.rate_limiter.consume(&req.tier, &req.caller_key).await?;
    Ok(Json(decision.into()))
}
