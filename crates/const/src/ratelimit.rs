//! Rate limit tier identifiers and default quotas.
//!
//! Tier names are part of the storage key schema (`ratelimit:{tier}:{caller}`)
//! and the `consume` RPC, so they must stay stable.

/// Tier for ordinary traffic from network-address and session callers.
pub const GENERAL: &str = "general";

/// Tier for authentication and credential operations.
pub const AUTH: &str = "auth";

/// Tier for upload-like operations such as generation requests.
pub const UPLOAD: &str = "upload";

/// Tier for payment operations.
pub const PAYMENT: &str = "payment";

/// Tier applied instead of [`GENERAL`] to API-key callers.
pub const API_KEY: &str = "api_key";

/// Every tier accepted by the `consume` RPC.
pub const TIERS: &[&str] = &[GENERAL, AUTH, UPLOAD, PAYMENT, API_KEY];

/// Default general quota: 100 requests per minute, 1 minute block.
pub const GENERAL_LIMIT: u32 = 100;
pub const GENERAL_WINDOW_SECONDS: u64 = 60;
pub const GENERAL_BLOCK_SECONDS: u64 = 60;

/// Default auth quota: 10 requests per 5 minutes, 10 minute block.
pub const AUTH_LIMIT: u32 = 10;
pub const AUTH_WINDOW_SECONDS: u64 = 5 * 60;
pub const AUTH_BLOCK_SECONDS: u64 = 10 * 60;

/// Default upload quota: 10 requests per hour, 1 hour block.
pub const UPLOAD_LIMIT: u32 = 10;
pub const UPLOAD_WINDOW_SECONDS: u64 = 60 * 60;
pub const UPLOAD_BLOCK_SECONDS: u64 = 60 * 60;

/// Default payment quota: 5 requests per 10 minutes, 30 minute block.
pub const PAYMENT_LIMIT: u32 = 5;
pub const PAYMENT_WINDOW_SECONDS: u64 = 10 * 60;
pub const PAYMENT_BLOCK_SECONDS: u64 = 30 * 60;

/// Default API-key quota: 1000 requests per minute, 1 minute block.
pub const API_KEY_LIMIT: u32 = 1000;
pub const API_KEY_WINDOW_SECONDS: u64 = 60;
pub const API_KEY_BLOCK_SECONDS: u64 = 60;

/// Extra time an idle bucket is kept after its window and block have passed.
pub const BUCKET_IDLE_GRACE_SECONDS: u64 = 5 * 60;

/// Maximum compare-and-set attempts for a single `consume` call.
pub const MAX_CAS_ATTEMPTS: usize = 16;
