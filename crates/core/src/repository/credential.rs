use bastion_control_const::ratelimit::MAX_CAS_ATTEMPTS;
use bastion_control_storage::{StorageBackend, StorageError, prefix_end};
use bastion_control_types::{
    entities::{CertificateAuthorityRecord, Credential, RevocationRecord},
    error::{Error, Result},
};
use chrono::{DateTime, Utc};

const CA_KEY: &[u8] = b"ca:root";
const REVOCATION_PREFIX: &[u8] = b"revocation:";

/// Repository for issued credentials, the revocation set and the CA record
///
/// Key schema:
/// - ca:root -> CertificateAuthorityRecord
/// - credential:serial:{serial} -> Credential data
/// - credential:identity:{service}:{common_name}:{serial} -> serial
/// - credential:fingerprint:{sha256} -> serial
/// - revocation:{serial} -> RevocationRecord
pub struct CredentialRepository<S: StorageBackend> {
    storage: S,
}

impl<S: StorageBackend> CredentialRepository<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    fn serial_key(serial: &str) -> Vec<u8> {
        format!("credential:serial:{serial}").into_bytes()
    }

    fn identity_prefix(service: &str, common_name: &str) -> Vec<u8> {
        format!("credential:identity:{service}:{common_name}:").into_bytes()
    }

    fn identity_key(service: &str, common_name: &str, serial: &str) -> Vec<u8> {
        format!("credential:identity:{service}:{common_name}:{serial}").into_bytes()
    }

    fn fingerprint_key(fingerprint: &str) -> Vec<u8> {
        format!("credential:fingerprint:{fingerprint}").into_bytes()
    }

    fn revocation_key(serial: &str) -> Vec<u8> {
        format!("revocation:{serial}").into_bytes()
    }

    /// Load the persisted certificate authority, if one was created
    pub async fn get_ca(&self) -> Result<Option<CertificateAuthorityRecord>> {
        let data = self
            .storage
            .get(CA_KEY)
            .await
            .map_err(|e| Error::internal(format!("Failed to load certificate authority: {e}")))?;

        data.map(|bytes| {
            serde_json::from_slice(&bytes).map_err(|e| {
                Error::internal(format!("Failed to deserialize certificate authority: {e}"))
            })
        })
        .transpose()
    }

    /// Store the certificate authority unless one already exists
    ///
    /// Returns `false` when another writer created it first.
    pub async fn create_ca(&self, record: &CertificateAuthorityRecord) -> Result<bool> {
        let data = serde_json::to_vec(record).map_err(|e| {
            Error::internal(format!("Failed to serialize certificate authority: {e}"))
        })?;

        match self.storage.compare_and_set(CA_KEY, None, data).await {
            Ok(()) => Ok(true),
            Err(StorageError::Conflict { .. }) => Ok(false),
            Err(e) => Err(Error::internal(format!("Failed to store certificate authority: {e}"))),
        }
    }

    /// Persist a new credential with its identity and fingerprint indexes
    pub async fn create(&self, credential: &Credential) -> Result<()> {
        let data = serde_json::to_vec(credential)
            .map_err(|e| Error::internal(format!("Failed to serialize credential: {e}")))?;

        let mut txn = self
            .storage
            .transaction()
            .await
            .map_err(|e| Error::internal(format!("Failed to start transaction: {e}")))?;

        txn.compare_and_set(Self::serial_key(&credential.serial), None, data)
            .map_err(|e| Error::internal(format!("Failed to stage credential: {e}")))?;
        txn.set(
            Self::identity_key(&credential.service_name, &credential.common_name, &credential.serial),
            credential.serial.clone().into_bytes(),
        );
        txn.set(
            Self::fingerprint_key(&credential.fingerprint),
            credential.serial.clone().into_bytes(),
        );

        txn.commit().await.map_err(|e| match e {
            StorageError::Conflict { .. } => {
                Error::conflict(format!("Credential serial {} already exists", credential.serial))
            },
            e => Error::internal(format!("Failed to commit credential creation: {e}")),
        })
    }

    async fn get_raw(&self, serial: &str) -> Result<Option<(Credential, Vec<u8>)>> {
        let data = self
            .storage
            .get(&Self::serial_key(serial))
            .await
            .map_err(|e| Error::internal(format!("Failed to get credential: {e}")))?;

        match data {
            Some(bytes) => {
                let credential = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::internal(format!("Failed to deserialize credential: {e}"))
                })?;
                Ok(Some((credential, bytes.to_vec())))
            },
            None => Ok(None),
        }
    }

    /// Get a credential by serial number
    pub async fn get(&self, serial: &str) -> Result<Option<Credential>> {
        Ok(self.get_raw(serial).await?.map(|(credential, _)| credential))
    }

    /// Get a credential by the SHA-256 fingerprint of its certificate
    pub async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Credential>> {
        let serial = self
            .storage
            .get(&Self::fingerprint_key(fingerprint))
            .await
            .map_err(|e| Error::internal(format!("Failed to look up fingerprint: {e}")))?;

        match serial {
            Some(bytes) => self.get(&String::from_utf8_lossy(&bytes)).await,
            None => Ok(None),
        }
    }

    /// Every credential ever issued to an identity, revoked ones included
    pub async fn list_by_identity(&self, service: &str, common_name: &str) -> Result<Vec<Credential>> {
        let start = Self::identity_prefix(service, common_name);
        let end = prefix_end(&start);

        let kvs = self
            .storage
            .get_range(start..end)
            .await
            .map_err(|e| Error::internal(format!("Failed to list identity credentials: {e}")))?;

        let mut credentials = Vec::with_capacity(kvs.len());
        for kv in kvs {
            if let Some(credential) = self.get(&String::from_utf8_lossy(&kv.value)).await? {
                credentials.push(credential);
            }
        }
        Ok(credentials)
    }

    /// Revoke every live credential of an identity and record the revocations
    ///
    /// All records and revocation entries are written in one transaction whose
    /// preconditions are the bytes that were read; the whole pass is retried
    /// if a concurrent writer got there first. Returns the credentials revoked
    /// by this call.
    pub async fn revoke_identity(
        &self,
        service: &str,
        common_name: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Credential>> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let start = Self::identity_prefix(service, common_name);
            let end = prefix_end(&start);
            let index = self
                .storage
                .get_range(start..end)
                .await
                .map_err(|e| Error::internal(format!("Failed to list identity credentials: {e}")))?;

            let mut txn = self
                .storage
                .transaction()
                .await
                .map_err(|e| Error::internal(format!("Failed to start transaction: {e}")))?;
            let mut revoked = Vec::new();

            for kv in index {
                let serial = String::from_utf8_lossy(&kv.value).into_owned();
                let Some((mut credential, raw)) = self.get_raw(&serial).await? else { continue };
                if credential.revoked {
                    continue;
                }

                credential.revoke(at);
                let data = serde_json::to_vec(&credential)
                    .map_err(|e| Error::internal(format!("Failed to serialize credential: {e}")))?;
                let record = serde_json::to_vec(&RevocationRecord::from(&credential)).map_err(|e| {
                    Error::internal(format!("Failed to serialize revocation record: {e}"))
                })?;

                txn.compare_and_set(Self::serial_key(&serial), Some(raw), data)
                    .map_err(|e| Error::internal(format!("Failed to stage revocation: {e}")))?;
                txn.set(Self::revocation_key(&serial), record);
                revoked.push(credential);
            }

            if revoked.is_empty() {
                return Ok(revoked);
            }

            match txn.commit().await {
                Ok(()) => return Ok(revoked),
                Err(StorageError::Conflict { .. }) => continue,
                Err(e) => return Err(Error::internal(format!("Failed to commit revocation: {e}"))),
            }
        }

        Err(Error::conflict(format!(
            "Credentials for {service}/{common_name} were modified concurrently"
        )))
    }

    /// Whether a serial is in the revocation set
    pub async fn is_revoked(&self, serial: &str) -> Result<bool> {
        self.storage
            .get(&Self::revocation_key(serial))
            .await
            .map(|entry| entry.is_some())
            .map_err(|e| Error::internal(format!("Failed to check revocation set: {e}")))
    }

    /// The full revocation set, ordered by serial
    pub async fn list_revocations(&self) -> Result<Vec<RevocationRecord>> {
        let kvs = self
            .storage
            .get_range(REVOCATION_PREFIX.to_vec()..prefix_end(REVOCATION_PREFIX))
            .await
            .map_err(|e| Error::internal(format!("Failed to list revocations: {e}")))?;

        kvs.iter()
            .map(|kv| {
                serde_json::from_slice(&kv.value).map_err(|e| {
                    Error::internal(format!("Failed to deserialize revocation record: {e}"))
                })
            })
            .collect()
    }
}
