use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, handlers::AppState};

const V1_PREFIX: &str = "/control/v1/";

/// Control-plane services whose routes can be degraded by fault rules
const DEGRADABLE_SERVICES: &[&str] = &["ratelimit", "jobs", "credentials"];

/// Service a request path belongs to, if its routes can be degraded
pub fn service_for_path(path: &str) -> Option<&'static str> {
    let segment = path.strip_prefix(V1_PREFIX)?.split('/').next()?;
    DEGRADABLE_SERVICES.iter().copied().find(|service| *service == segment)
}

/// Apply live fault rules for the service owning the route
pub async fn inject_route_faults(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(service) = service_for_path(req.uri().path())
        && let Err(e) = state.faults.apply(service).await
    {
        return ApiError(e).into_response();
    }
    next.run(req).await
}
