use bastion_control_const::ratelimit as tiers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quota of one rate-limit tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Points granted per window
    pub limit: u32,
    pub window_secs: u64,
    /// How long a caller stays rejected once the window is exhausted
    pub block_secs: u64,
}

impl RateLimit {
    pub const fn new(limit: u32, window_secs: u64, block_secs: u64) -> Self {
        Self { limit, window_secs, block_secs }
    }

    /// Storage TTL for a bucket of this tier
    pub fn bucket_ttl_secs(&self) -> u64 {
        self.window_secs.max(self.block_secs) + tiers::BUCKET_IDLE_GRACE_SECONDS
    }
}

/// Quotas for every tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitTable {
    pub general: RateLimit,
    pub auth: RateLimit,
    pub upload: RateLimit,
    pub payment: RateLimit,
    pub api_key: RateLimit,
}

impl RateLimitTable {
    /// Quota for a tier name, `None` for unknown tiers
    pub fn get(&self, tier: &str) -> Option<RateLimit> {
        match tier {
            tiers::GENERAL => Some(self.general),
            tiers::AUTH => Some(self.auth),
            tiers::UPLOAD => Some(self.upload),
            tiers::PAYMENT => Some(self.payment),
            tiers::API_KEY => Some(self.api_key),
            _ => None,
        }
    }
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self {
            general: RateLimit::new(
                tiers::GENERAL_LIMIT,
                tiers::GENERAL_WINDOW_SECONDS,
                tiers::GENERAL_BLOCK_SECONDS,
            ),
            auth: RateLimit::new(tiers::AUTH_LIMIT, tiers::AUTH_WINDOW_SECONDS, tiers::AUTH_BLOCK_SECONDS),
            upload: RateLimit::new(
                tiers::UPLOAD_LIMIT,
                tiers::UPLOAD_WINDOW_SECONDS,
                tiers::UPLOAD_BLOCK_SECONDS,
            ),
            payment: RateLimit::new(
                tiers::PAYMENT_LIMIT,
                tiers::PAYMENT_WINDOW_SECONDS,
                tiers::PAYMENT_BLOCK_SECONDS,
            ),
            api_key: RateLimit::new(
                tiers::API_KEY_LIMIT,
                tiers::API_KEY_WINDOW_SECONDS,
                tiers::API_KEY_BLOCK_SECONDS,
            ),
        }
    }
}

/// Persisted state of one `(tier, caller)` token bucket
///
/// Buckets are created lazily on a caller's first request and expire from
/// storage after a period of inactivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBucket {
    /// Points left in the current window; never exceeds the tier capacity
    pub points_remaining: u32,
    /// Start of the current window
    pub window_start: DateTime<Utc>,
    /// Window length the bucket was created with
    pub window_duration_secs: u64,
    /// End of the active block, if any
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitBucket {
    /// Fresh bucket with a full window starting at `now`
    pub fn new(capacity: u32, window_duration_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            points_remaining: capacity,
            window_start: now,
            window_duration_secs,
            blocked_until: None,
        }
    }

    /// End of the current window
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_start + chrono::Duration::seconds(self.window_duration_secs as i64)
    }

    /// Whether a block is active at `now`
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}
