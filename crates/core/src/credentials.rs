//! Internal certificate authority for service-to-service mTLS.
//!
//! The CA key pair is generated once, encrypted under the master key and kept
//! at `ca:root`; every instance sharing the storage signs with the same CA.
//! Leaf key material is returned to the caller exactly once and only its
//! ciphertext is stored.

use bastion_control_const::{
    duration::{CA_VALIDITY_DAYS, CREDENTIAL_VALIDITY_DAYS},
    limits::{DEFAULT_KNOWN_SERVICES, MAX_COMMON_NAME_LENGTH},
};
use bastion_control_storage::StorageBackend;
use bastion_control_types::{
    entities::{CertificateAuthorityRecord, Credential, RevocationRecord},
    error::{Error, Result},
    validation::{codes, common_name_regex, validate_service_name},
};
use bon::Builder;
use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};
use rustls_pki_types::{CertificateDer, pem::PemObject};
use sha2::{Digest, Sha256};

use crate::{crypto::SecretEncryptor, repository::CredentialRepository};

const CA_COMMON_NAME: &str = "Bastion Control Internal CA";
const ORGANIZATION: &str = "Bastion";

/// Issuance policy of the authority
#[derive(Debug, Clone, Builder)]
pub struct CredentialAuthorityConfig {
    #[builder(default = CREDENTIAL_VALIDITY_DAYS)]
    pub validity_days: i64,
    /// Services allowed to hold credentials; empty accepts any well-formed name
    #[builder(default = DEFAULT_KNOWN_SERVICES.iter().map(|s| s.to_string()).collect())]
    pub known_services: Vec<String>,
}

impl Default for CredentialAuthorityConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A freshly issued credential together with its clear-text private key
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub credential: Credential,
    pub private_key_pem: String,
    pub ca_certificate_pem: String,
}

/// Result of a revocation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationOutcome {
    /// Serials revoked by this call; empty when everything was already revoked
    pub revoked_serials: Vec<String>,
    pub message: String,
}

fn to_offset(at: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| Error::internal(format!("Certificate timestamp out of range: {e}")))
}

fn ca_params(created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<CertificateParams> {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, CA_COMMON_NAME);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = to_offset(created_at)?;
    params.not_after = to_offset(expires_at)?;
    Ok(params)
}

fn random_serial() -> (SerialNumber, String) {
    use rand::Rng;
    let mut bytes: [u8; 16] = rand::rng().random();
    // positive, and no leading zero byte to be stripped by DER
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    (SerialNumber::from(bytes.to_vec()), hex::encode(bytes))
}

/// Hex SHA-256 of the DER inside the first PEM certificate block
pub fn certificate_fingerprint(pem: &str) -> Result<String> {
    let der = CertificateDer::from_pem_slice(pem.as_bytes())
        .map_err(|_| Error::unauthorized("Certificate is not PEM encoded"))?;
    Ok(hex::encode(Sha256::digest(der.as_ref())))
}

/// Issues, revokes and verifies service credentials
pub struct CredentialAuthority<S: StorageBackend> {
    repo: CredentialRepository<S>,
    encryptor: SecretEncryptor,
    config: CredentialAuthorityConfig,
    issuer: Issuer<'static, KeyPair>,
    ca: CertificateAuthorityRecord,
}

impl<S: StorageBackend> CredentialAuthority<S> {
    /// Load the CA from storage, creating it on first start
    pub async fn initialize(
        storage: S,
        encryptor: SecretEncryptor,
        config: CredentialAuthorityConfig,
    ) -> Result<Self> {
        let repo = CredentialRepository::new(storage);

        let ca = match repo.get_ca().await? {
            Some(record) => record,
            None => {
                let record = Self::generate_ca(&encryptor)?;
                if repo.create_ca(&record).await? {
                    tracing::info!(expires_at = %record.expires_at, "Created internal certificate authority");
                    record
                } else {
                    // another instance won the race
                    repo.get_ca()
                        .await?
                        .ok_or_else(|| Error::internal("Certificate authority vanished after creation"))?
                }
            },
        };

        let key_pem = encryptor.decrypt_string(&ca.encrypted_key)?;
        let key = KeyPair::from_pem(&key_pem)
            .map_err(|e| Error::internal(format!("Failed to load CA key: {e}")))?;
        let issuer = Issuer::new(ca_params(ca.created_at, ca.expires_at)?, key);

        Ok(Self { repo, encryptor, config, issuer, ca })
    }

    fn generate_ca(encryptor: &SecretEncryptor) -> Result<CertificateAuthorityRecord> {
        let created_at = Utc::now();
        let expires_at = created_at + Duration::days(CA_VALIDITY_DAYS);

        let key = KeyPair::generate()
            .map_err(|e| Error::internal(format!("Failed to generate CA key: {e}")))?;
        let certificate = ca_params(created_at, expires_at)?
            .self_signed(&key)
            .map_err(|e| Error::internal(format!("Failed to self-sign CA certificate: {e}")))?;

        Ok(CertificateAuthorityRecord {
            certificate_pem: certificate.pem(),
            encrypted_key: encryptor.encrypt(key.serialize_pem().as_bytes())?,
            created_at,
            expires_at,
        })
    }

    /// Trust anchor PEM and its expiry
    pub fn ca_certificate(&self) -> (&str, DateTime<Utc>) {
        (&self.ca.certificate_pem, self.ca.expires_at)
    }

    fn validate_identity(&self, service: &str, common_name: &str) -> Result<()> {
        validate_service_name("serviceName", service)?;

        if common_name.len() > MAX_COMMON_NAME_LENGTH || !common_name_regex().is_match(common_name)
        {
            return Err(Error::invalid_field(
                "commonName",
                codes::INVALID_STRING,
                "commonName has an invalid format",
            ));
        }
        Ok(())
    }

    /// Issue a new credential for `(service, common_name)`
    ///
    /// Existing live credentials for the same identity stay valid.
    pub async fn issue(&self, service: &str, common_name: &str) -> Result<IssuedCredential> {
        self.validate_identity(service, common_name)?;
        if !self.config.known_services.is_empty()
            && !self.config.known_services.iter().any(|known| known == service)
        {
            return Err(Error::invalid_field(
                "serviceName",
                codes::UNKNOWN_SERVICE,
                format!("Unknown service: {service}"),
            ));
        }

        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::days(self.config.validity_days);
        let (serial_number, serial) = random_serial();

        let mut params = CertificateParams::new(vec![common_name.to_string()])
            .map_err(|e| Error::internal(format!("Failed to build certificate parameters: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn.push(DnType::OrganizationalUnitName, service);
        dn.push(DnType::OrganizationName, ORGANIZATION);
        params.distinguished_name = dn;
        params.serial_number = Some(serial_number);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages =
            vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages =
            vec![ExtendedKeyUsagePurpose::ClientAuth, ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;
        params.not_before = to_offset(issued_at)?;
        params.not_after = to_offset(expires_at)?;

        let key = KeyPair::generate()
            .map_err(|e| Error::internal(format!("Failed to generate key pair: {e}")))?;
        let certificate = params
            .signed_by(&key, &self.issuer)
            .map_err(|e| Error::internal(format!("Failed to sign certificate: {e}")))?;

        let certificate_pem = certificate.pem();
        let private_key_pem = key.serialize_pem();
        let credential = Credential {
            serial,
            service_name: service.to_string(),
            common_name: common_name.to_string(),
            fingerprint: certificate_fingerprint(&certificate_pem)?,
            certificate_pem,
            encrypted_key: self.encryptor.encrypt(private_key_pem.as_bytes())?,
            issued_at,
            expires_at,
            revoked: false,
            revoked_at: None,
        };
        self.repo.create(&credential).await?;

        crate::metrics::record_credential_issued();
        tracing::info!(
            service,
            common_name,
            serial = %credential.serial,
            expires_at = %credential.expires_at,
            "Issued credential"
        );

        Ok(IssuedCredential {
            credential,
            private_key_pem,
            ca_certificate_pem: self.ca.certificate_pem.clone(),
        })
    }

    /// Revoke every live credential of `(service, common_name)`
    pub async fn revoke(&self, service: &str, common_name: &str) -> Result<RevocationOutcome> {
        self.validate_identity(service, common_name)?;

        if self.repo.list_by_identity(service, common_name).await?.is_empty() {
            return Err(Error::not_found(format!(
                "No credentials issued for {service}/{common_name}"
            )));
        }

        let revoked = self.repo.revoke_identity(service, common_name, Utc::now()).await?;
        let revoked_serials: Vec<String> = revoked.into_iter().map(|c| c.serial).collect();

        let message = if revoked_serials.is_empty() {
            format!("Credentials for {service}/{common_name} are already revoked")
        } else {
            crate::metrics::record_credentials_revoked(revoked_serials.len());
            tracing::info!(service, common_name, serials = ?revoked_serials, "Revoked credentials");
            format!("Revoked {} credential(s) for {service}/{common_name}", revoked_serials.len())
        };

        Ok(RevocationOutcome { revoked_serials, message })
    }

    /// Check a presented certificate against the issued set and revocations
    ///
    /// Every rejection is `UNAUTHORIZED`.
    pub async fn verify(
        &self,
        service: &str,
        common_name: &str,
        certificate_pem: &str,
    ) -> Result<Credential> {
        let result = self.check(service, common_name, certificate_pem).await;
        let label = match &result {
            Ok(_) => "valid",
            Err(e) if e.error_code() == "UNAUTHORIZED" => "rejected",
            Err(_) => "error",
        };
        crate::metrics::record_credential_verification(label);
        if let Err(e) = &result {
            tracing::debug!(service, common_name, error = %e, "Credential verification failed");
        }
        result
    }

    async fn check(&self, service: &str, common_name: &str, certificate_pem: &str) -> Result<Credential> {
        let fingerprint = certificate_fingerprint(certificate_pem)?;
        let credential = self
            .repo
            .get_by_fingerprint(&fingerprint)
            .await?
            .ok_or_else(|| Error::unauthorized("Certificate was not issued by this authority"))?;

        if credential.service_name != service || credential.common_name != common_name {
            return Err(Error::unauthorized("Certificate does not belong to this identity"));
        }
        if credential.revoked || self.repo.is_revoked(&credential.serial).await? {
            return Err(Error::unauthorized("Certificate has been revoked"));
        }
        if credential.is_expired_at(Utc::now()) {
            return Err(Error::unauthorized("Certificate has expired"));
        }
        Ok(credential)
    }

    /// The full revocation set
    pub async fn revocations(&self) -> Result<Vec<RevocationRecord>> {
        self.repo.list_revocations().await
    }
}
