use std::fmt;

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest of a secret
const DIGEST_HEX_LEN: usize = 16;

/// Stable identity of a caller, used to key rate-limit buckets
///
/// API keys and session tokens are never stored raw: only a truncated
/// SHA-256 digest is kept, so the rendered key is safe to log and persist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerKey {
    /// Network address of the caller
    Ip(String),
    /// Digest of an API key
    ApiKey(String),
    /// Digest of a session token
    Session(String),
}

impl CallerKey {
    /// Caller identified by network address
    pub fn ip(addr: impl Into<String>) -> Self {
        CallerKey::Ip(addr.into())
    }

    /// Caller identified by an API key (digested)
    pub fn api_key(raw: &str) -> Self {
        CallerKey::ApiKey(digest(raw))
    }

    /// Caller identified by a session token (digested)
    pub fn session(raw: &str) -> Self {
        CallerKey::Session(digest(raw))
    }

    /// Caller with no resolvable identity
    pub fn unknown() -> Self {
        CallerKey::Ip("unknown".to_string())
    }

    /// Whether the caller presented an API key
    pub fn is_api_key(&self) -> bool {
        matches!(self, CallerKey::ApiKey(_))
    }
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerKey::Ip(addr) => write!(f, "ip:{addr}"),
            CallerKey::ApiKey(digest) => write!(f, "apikey:{digest}"),
            CallerKey::Session(digest) => write!(f, "session:{digest}"),
        }
    }
}

fn digest(raw: &str) -> String {
    let mut encoded = hex::encode(Sha256::digest(raw.as_bytes()));
    encoded.truncate(DIGEST_HEX_LEN);
    encoded
}
