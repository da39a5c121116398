//! Multi-tier token-bucket rate limiting over the shared storage backend.
//!
//! Each `(tier, caller)` pair owns one bucket stored at
//! `ratelimit:{tier}:{caller}`. Updates are read-modify-write cycles guarded by
//! compare-and-set on that single key, so concurrent requests for the same
//! caller never both take the last point while unrelated callers never
//! contend.

use std::time::Duration;

use bastion_control_const::ratelimit::{self as tiers, MAX_CAS_ATTEMPTS};
use bastion_control_storage::{StorageBackend, StorageError};
use bastion_control_types::{
    RateLimitDecisionResponse, RateLimitDetails,
    entities::{RateLimit, RateLimitBucket, RateLimitTable},
    error::{Error, Result},
    validation::codes,
};
use chrono::{DateTime, Utc};

/// Outcome of consuming one point from a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Tier capacity per window
    pub limit: u32,
    pub remaining: u32,
    /// When the caller regains capacity: the window end when allowed, the
    /// block end when rejected
    pub reset_at: DateTime<Utc>,
    /// Seconds to wait before retrying; set only on rejection and always >= 1
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    /// Seconds until `reset_at`, rounded up
    pub fn reset_after_secs(&self, now: DateTime<Utc>) -> u64 {
        ceil_secs(self.reset_at - now)
    }

    /// The `RATE_LIMITED` error for a rejected decision
    pub fn to_error(&self, tier: &str) -> Error {
        Error::rate_limited(rejection_message(tier), self.retry_after_secs.unwrap_or(1))
    }

    /// Back-off data for the error envelope
    pub fn details(&self) -> RateLimitDetails {
        RateLimitDetails {
            retry_after_seconds: self.retry_after_secs.unwrap_or(0),
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
        }
    }
}

impl From<RateLimitDecision> for RateLimitDecisionResponse {
    fn from(decision: RateLimitDecision) -> Self {
        Self {
            allowed: decision.allowed,
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
            retry_after_seconds: decision.retry_after_secs,
        }
    }
}

/// Caller-facing message for a rejection on `tier`
pub fn rejection_message(tier: &str) -> &'static str {
    match tier {
        tiers::AUTH => "Too many authentication attempts. Please try again later.",
        tiers::UPLOAD => "Upload limit exceeded. Please try again later.",
        tiers::PAYMENT => "Too many payment requests. Please try again later.",
        _ => "Too many requests. Please try again later.",
    }
}

fn ceil_secs(delta: chrono::Duration) -> u64 {
    let millis = delta.num_milliseconds();
    if millis <= 0 { 0 } else { (millis as u64).div_ceil(1000) }
}

/// Consume one point from `bucket` at `now`
///
/// Pure state transition: returns the bucket to persist and the decision.
/// A missing bucket is created full. A window that has elapsed is refilled
/// unless a block is still active; rejecting during a block extends it.
pub fn apply(
    bucket: Option<RateLimitBucket>,
    limit: RateLimit,
    now: DateTime<Utc>,
) -> (RateLimitBucket, RateLimitDecision) {
    let mut bucket =
        bucket.unwrap_or_else(|| RateLimitBucket::new(limit.limit, limit.window_secs, now));
    let block = chrono::Duration::seconds(limit.block_secs as i64);

    let blocked = bucket.is_blocked_at(now);
    if !blocked {
        if now >= bucket.window_end() {
            bucket = RateLimitBucket::new(limit.limit, limit.window_secs, now);
        } else {
            // quota may have been lowered since the bucket was written
            bucket.points_remaining = bucket.points_remaining.min(limit.limit);
        }

        if bucket.points_remaining > 0 {
            bucket.points_remaining -= 1;
            let decision = RateLimitDecision {
                allowed: true,
                limit: limit.limit,
                remaining: bucket.points_remaining,
                reset_at: bucket.window_end(),
                retry_after_secs: None,
            };
            return (bucket, decision);
        }
    }

    // No point left until the window ends, and the block never ends before it
    let blocked_until = (now + block).max(bucket.window_end());
    bucket.points_remaining = 0;
    bucket.blocked_until = Some(blocked_until);

    let decision = RateLimitDecision {
        allowed: false,
        limit: limit.limit,
        remaining: 0,
        reset_at: blocked_until,
        retry_after_secs: Some(ceil_secs(blocked_until - now).max(1)),
    };
    (bucket, decision)
}

/// Rate limiter over a storage backend
///
/// ```rust,no_run
/// use bastion_control_core::RateLimiter;
/// use bastion_control_storage::MemoryBackend;
/// use bastion_control_types::entities::RateLimitTable;
///
/// # async fn example() {
/// let limiter = RateLimiter::new(MemoryBackend::new(), RateLimitTable::default());
/// let decision = limiter.consume("auth", "ip:203.0.113.5").await.unwrap();
/// if !decision.allowed {
///     println!("retry in {:?}s", decision.retry_after_secs);
/// }
/// # }
/// ```
pub struct RateLimiter<S: StorageBackend> {
    storage: S,
    limits: RateLimitTable,
}

impl<S: StorageBackend> RateLimiter<S> {
    pub fn new(storage: S, limits: RateLimitTable) -> Self {
        Self { storage, limits }
    }

    /// Configured quota of a tier
    pub fn limit_for(&self, tier: &str) -> Result<RateLimit> {
        self.limits.get(tier).ok_or_else(|| {
            Error::invalid_field("tier", codes::INVALID_ENUM_VALUE, "Unknown rate limit tier")
        })
    }

    fn bucket_key(tier: &str, caller: &str) -> Vec<u8> {
        format!("ratelimit:{tier}:{caller}").into_bytes()
    }

    /// Consume one point for `caller` on `tier` at the current time
    pub async fn consume(&self, tier: &str, caller: &str) -> Result<RateLimitDecision> {
        self.consume_at(tier, caller, Utc::now()).await
    }

    /// Consume one point as of `now`
    pub async fn consume_at(
        &self,
        tier: &str,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let limit = self.limit_for(tier)?;
        let key = Self::bucket_key(tier, caller);
        let ttl = Duration::from_secs(limit.bucket_ttl_secs());

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .storage
                .get(&key)
                .await
                .map_err(|e| Error::internal(format!("Failed to read rate limit bucket: {e}")))?;

            let bucket = match &current {
                Some(bytes) => match serde_json::from_slice::<RateLimitBucket>(bytes) {
                    Ok(bucket) => Some(bucket),
                    Err(e) => {
                        tracing::warn!(tier, caller, error = %e, "Discarding unreadable rate limit bucket");
                        None
                    },
                },
                None => None,
            };

            let (next, decision) = apply(bucket, limit, now);
            let encoded = serde_json::to_vec(&next)
                .map_err(|e| Error::internal(format!("Failed to serialize rate limit bucket: {e}")))?;

            match self
                .storage
                .compare_and_set_with_ttl(&key, current.as_deref(), encoded, ttl)
                .await
            {
                Ok(()) => {
                    if !decision.allowed {
                        tracing::debug!(
                            tier,
                            caller,
                            retry_after = ?decision.retry_after_secs,
                            "Rate limit exceeded"
                        );
                        crate::metrics::record_rate_limit_exceeded(tier);
                    }
                    return Ok(decision);
                },
                Err(StorageError::Conflict { .. }) => {
                    tracing::trace!(tier, caller, attempt, "Rate limit bucket contended, retrying");
                    tokio::task::yield_now().await;
                },
                Err(e) => {
                    return Err(Error::internal(format!("Failed to update rate limit bucket: {e}")));
                },
            }
        }

        Err(Error::internal(format!(
            "Rate limit bucket for tier {tier} stayed contended after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }

    /// Consume a point and turn a rejection into a `RATE_LIMITED` error
    pub async fn enforce(&self, tier: &str, caller: &str) -> Result<RateLimitDecision> {
        let decision = self.consume(tier, caller).await?;
        if decision.allowed { Ok(decision) } else { Err(decision.to_error(tier)) }
    }
}
