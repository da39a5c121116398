use axum::{Json, extract::State};
use bastion_control_types::{
    CaCertificateResponse, IssueCredentialRequest, IssueCredentialResponse,
    RevocationListResponse, RevokeCredentialRequest, RevokeCredentialResponse,
    VerifyCredentialRequest, VerifyCredentialResponse,
};

use super::AppState;
use crate::{error::Result, extract::ValidatedJson};

/// Issue an mTLS client/server certificate for a service identity
///
/// POST /control/v1/credentials/issue
///
/// The private key is only ever returned here; storage keeps it encrypted.
pub async fn issue(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IssueCredentialRequest>,
) -> Result<Json<IssueCredentialResponse>> {
    let issued = state.credentials.issue(&req.service_name, &req.common_name).await?;
    Ok(Json(IssueCredentialResponse {
        certificate: issued.credential.certificate_pem,
        key: issued.private_key_pem,
        serial_number: issued.credential.serial,
        ca_certificate: issued.ca_certificate_pem,
        issued_at: issued.credential.issued_at,
        expires_at: issued.credential.expires_at,
    }))
}

/// POST /control/v1/credentials/revoke
pub async fn revoke(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RevokeCredentialRequest>,
) -> Result<Json<RevokeCredentialResponse>> {
    let outcome = state.credentials.revoke(&req.service_name, &req.common_name).await?;
    Ok(Json(RevokeCredentialResponse {
        success: true,
        message: outcome.message,
        revoked_serials: outcome.revoked_serials,
    }))
}

/// POST /control/v1/credentials/verify
pub async fn verify(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyCredentialRequest>,
) -> Result<Json<VerifyCredentialResponse>> {
    let credential =
        state.credentials.verify(&req.service_name, &req.common_name, &req.certificate).await?;
    Ok(Json(VerifyCredentialResponse {
        valid: true,
        serial_number: credential.serial,
        expires_at: credential.expires_at,
    }))
}

/// GET /control/v1/credentials/revocations
pub async fn revocations(State(state): State<AppState>) -> Result<Json<RevocationListResponse>> {
    let revocations = state.credentials.revocations().await?.into_iter().map(Into::into).collect();
    Ok(Json(RevocationListResponse { revocations }))
}

/// GET /control/v1/credentials/ca
pub async fn ca_certificate(State(state): State<AppState>) -> Json<CaCertificateResponse> {
    let (certificate, expires_at) = state.credentials.ca_certificate();
    Json(CaCertificateResponse { certificate: certificate.to_string(), expires_at })
}
