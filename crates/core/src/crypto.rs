use std::{fs, path::Path};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use bastion_control_types::error::{Error, Result};

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Master encryption key (256-bit / 32 bytes)
///
/// Protects private key material at rest (the internal CA key and every issued
/// credential key). Loaded from a file, or generated on first startup.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Load the master key from `path`, or generate and persist a new one
    ///
    /// Parent directories are created as needed and the file is written with
    /// 0600 permissions on Unix.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!(path = %path.display(), "Master key file not found, generating new key");
            let key = Self::generate();
            key.save_to_file(path)?;
            Ok(key)
        }
    }

    /// A fresh random key that is never written to disk
    pub fn ephemeral() -> Self {
        Self::generate()
    }

    fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Self(rng.random())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            Error::config(format!("Failed to read master key file '{}': {e}", path.display()))
        })?;

        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::config(format!(
                "Master key file '{}' has invalid length: {} bytes (expected 32)",
                path.display(),
                bytes.len()
            ))
        })?;

        tracing::info!(path = %path.display(), "Loaded master key from file");
        Ok(Self(key))
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::config(format!("Failed to create directory '{}': {e}", parent.display()))
            })?;
        }

        fs::write(path, self.0).map_err(|e| {
            Error::config(format!("Failed to write master key file '{}': {e}", path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).map_err(|e| {
                Error::config(format!("Failed to set permissions on '{}': {e}", path.display()))
            })?;
        }

        tracing::info!(path = %path.display(), "Generated and saved new master key");
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

/// AES-256-GCM encryption of key material for storage
///
/// Output is base64 of `nonce (12 bytes) || ciphertext`, with a fresh random
/// nonce per call.
pub struct SecretEncryptor {
    cipher: Aes256Gcm,
}

impl SecretEncryptor {
    pub fn new(master_key: &[u8; 32]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(master_key)
            .map_err(|e| Error::internal(format!("Failed to initialize cipher: {e}")))?;

        Ok(Self { cipher })
    }

    pub fn from_master_key(master_key: &MasterKey) -> Result<Self> {
        Self::new(master_key.as_bytes())
    }

    /// Encrypt secret bytes (typically a PEM private key)
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        if plaintext.is_empty() {
            return Err(Error::internal("Refusing to encrypt empty key material"));
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::internal(format!("Failed to encrypt key material: {e}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64_STANDARD.encode(&combined))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, encrypted_base64: &str) -> Result<Vec<u8>> {
        let combined = BASE64_STANDARD
            .decode(encrypted_base64)
            .map_err(|e| Error::internal(format!("Failed to decode encrypted key: {e}")))?;

        if combined.len() <= NONCE_LEN {
            return Err(Error::internal("Encrypted data too short (missing nonce)"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::internal(format!("Failed to decrypt key material: {e}")))
    }

    /// Decrypt into a UTF-8 string (PEM material)
    pub fn decrypt_string(&self, encrypted_base64: &str) -> Result<String> {
        String::from_utf8(self.decrypt(encrypted_base64)?)
            .map_err(|_| Error::internal("Decrypted key material is not valid UTF-8"))
    }
}
