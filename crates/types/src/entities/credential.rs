use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued mutual-TLS credential
///
/// The certificate is public; the private key is stored only in encrypted form
/// (AES-256-GCM under the master key). Revocation is permanent: once
/// `revoked` is set it is never cleared, and re-issuing for the same identity
/// creates a new credential with a new serial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Hex-encoded certificate serial number
    pub serial: String,
    pub service_name: String,
    pub common_name: String,
    /// PEM-encoded leaf certificate
    pub certificate_pem: String,
    /// Base64 AES-256-GCM ciphertext of the PEM private key (nonce prepended)
    pub encrypted_key: String,
    /// SHA-256 of the DER certificate, hex-encoded
    pub fingerprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether the credential is past its validity window at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the credential can pass verification at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    /// Mark the credential revoked; revocation is one-way
    pub fn revoke(&mut self, at: DateTime<Utc>) {
        if !self.revoked {
            self.revoked = true;
            self.revoked_at = Some(at);
        }
    }
}

/// Entry of the durable revocation set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub serial: String,
    pub service_name: String,
    pub common_name: String,
    pub revoked_at: DateTime<Utc>,
    /// Original expiry of the revoked credential
    pub expires_at: DateTime<Utc>,
}

impl From<&Credential> for RevocationRecord {
    fn from(credential: &Credential) -> Self {
        Self {
            serial: credential.serial.clone(),
            service_name: credential.service_name.clone(),
            common_name: credential.common_name.clone(),
            revoked_at: credential.revoked_at.unwrap_or_else(Utc::now),
            expires_at: credential.expires_at,
        }
    }
}

/// Persisted internal certificate authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAuthorityRecord {
    pub certificate_pem: String,
    /// Base64 AES-256-GCM ciphertext of the CA private key PEM
    pub encrypted_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
