pub mod faults;
pub mod identity;
pub mod logging;
pub mod ratelimit;

pub use faults::inject_route_faults;
pub use identity::resolve_identity;
pub use logging::logging_middleware;
pub use ratelimit::{auth_rate_limit, general_rate_limit, upload_rate_limit};
