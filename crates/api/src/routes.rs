use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    error::{handle_panic, method_not_allowed, route_not_found},
    handlers::{
        AppState, credentials, faults, healthz_handler, jobs, livez_handler, metrics_handler,
        ratelimit, readyz_handler, startupz_handler,
    },
    middleware::{
        auth_rate_limit, general_rate_limit, inject_route_faults, logging_middleware,
        resolve_identity, upload_rate_limit,
    },
};

/// Create router with state and middleware applied
///
/// Every `/control/v1` route resolves the caller and consumes from the
/// `general` (or `api_key`) tier. Issuing and revoking credentials also consume
/// from `auth`, job creation from `upload`. Fault rules can degrade the rate-limit, job and
/// credential routes but never the fault-management routes.
pub fn create_router_with_state(state: AppState) -> axum::Router {
    let credential_changes = Router::new()
        .route("/control/v1/credentials/issue", post(credentials::issue))
        .route("/control/v1/credentials/revoke", post(credentials::revoke))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_rate_limit));

    let credential_routes = Router::new()
        .route("/control/v1/credentials/verify", post(credentials::verify))
        .route("/control/v1/credentials/revocations", get(credentials::revocations))
        .route("/control/v1/credentials/ca", get(credentials::ca_certificate))
        .merge(credential_changes);

    let job_creation = Router::new()
        .route("/control/v1/jobs", post(jobs::create_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), upload_rate_limit));

    let degradable = Router::new()
        .route("/control/v1/ratelimit/consume", post(ratelimit::consume))
        .route("/control/v1/jobs/{job_id}", get(jobs::get_job))
        .merge(job_creation)
        .merge(credential_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), inject_route_faults));

    let fault_routes = Router::new()
        .route("/control/v1/faults", get(faults::list_faults).delete(faults::clear_faults))
        .route("/control/v1/faults/latency", post(faults::inject_latency))
        .route("/control/v1/faults/failure", post(faults::inject_failure))
        .route("/control/v1/faults/{service}", delete(faults::clear_service_faults));

    let control_routes = Router::new()
        .merge(degradable)
        .merge(fault_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), general_rate_limit))
        .route_layer(middleware::from_fn(resolve_identity));

    Router::new()
        .route("/livez", get(livez_handler))
        .route("/readyz", get(readyz_handler))
        .route("/startupz", get(startupz_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .merge(control_routes)
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(CatchPanicLayer::custom(handle_panic))
}
