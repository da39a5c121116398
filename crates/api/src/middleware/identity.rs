use axum::{extract::Request, middleware::Next, response::Response};
use bastion_control_types::CallerKey;

use crate::extract::resolve_caller;

/// Resolve the caller once and store the [`CallerKey`] in request extensions
pub async fn resolve_identity(mut req: Request, next: Next) -> Response {
    if req.extensions().get::<CallerKey>().is_none() {
        let caller = resolve_caller(&req);
        req.extensions_mut().insert(caller);
    }
    next.run(req).await
}
