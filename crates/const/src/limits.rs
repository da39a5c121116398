//! Input constraint constants.

/// Minimum prompt length for a generation job, counted in characters after trimming.
pub const MIN_PROMPT_LENGTH: usize = 10;

/// Maximum prompt length for a generation job.
pub const MAX_PROMPT_LENGTH: usize = 2000;

/// Shortest generation duration a job may request, in seconds.
pub const MIN_GENERATION_SECONDS: i64 = 1;

/// Longest generation duration a job may request, in seconds.
pub const MAX_GENERATION_SECONDS: i64 = 90;

/// Generation duration used when the request omits one.
pub const DEFAULT_GENERATION_SECONDS: i64 = 5;

/// Accepted generation styles. The first entry is the default.
pub const GENERATION_STYLES: &[&str] = &["cinematic", "anime", "photorealistic", "cartoon"];

/// Accepted aspect ratios. The first entry is the default.
pub const ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1", "4:3"];

/// Accepted quality levels. The first entry is the default.
pub const QUALITY_LEVELS: &[&str] = &["standard", "high", "ultra"];

/// Maximum length of a job owner identifier.
pub const MAX_OWNER_ID_LENGTH: usize = 128;

/// Pattern every service name must match (lowercase, 1-63 chars).
pub const SERVICE_NAME_PATTERN: &str = "^[a-z0-9][a-z0-9_-]{0,62}$";

/// Maximum length of a certificate common name.
pub const MAX_COMMON_NAME_LENGTH: usize = 253;

/// Largest latency a fault rule may inject, in milliseconds.
pub const MAX_FAULT_LATENCY_MS: i64 = 60_000;

/// Maximum length of an injected failure message.
pub const MAX_FAULT_MESSAGE_LENGTH: usize = 500;

/// Longest window a fault rule may stay installed, in seconds.
pub const MAX_FAULT_WINDOW_SECONDS: i64 = 3600;

/// Services the credential authority will issue for when none are configured.
pub const DEFAULT_KNOWN_SERVICES: &[&str] = &[
    "acquisition",
    "chaos",
    "dating",
    "feed",
    "marketing",
    "marketplace",
    "media-generation",
    "moderation",
    "monetization",
    "security",
    "seo",
    "sora",
    "xai",
];

/// Longest caller key accepted by the `consume` RPC.
pub const MAX_CALLER_KEY_LENGTH: usize = 256;

/// Longest certificate PEM accepted for verification.
pub const MAX_CERTIFICATE_PEM_LENGTH: usize = 16 * 1024;

/// Trigger probability used when an injection request omits one.
pub const DEFAULT_FAULT_PROBABILITY: f64 = 0.5;

/// Pattern for certificate common names (DNS-style labels).
pub const COMMON_NAME_PATTERN: &str = "^[a-zA-Z0-9][a-zA-Z0-9._-]*$";
