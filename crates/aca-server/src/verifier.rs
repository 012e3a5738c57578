//! Signed request verification
//!
//! Both authenticated operations share one protocol, differing only in the
//! payload type and the peer authority whose root key signed the request:
//!
//! 1. reject the request if a required field is absent
//! 2. detach the signature, clearing the field before serializing
//! 3. verify the SHA3-256 digest of the cleared payload against the peer
//!    root's public key
//! 4. parse the caller's enrollment certificate and its `id\role\affiliation`
//!    common name

use aca_core::{detach_signature, AttributeOwner, ParsedCertificate, RequiredField, SignedRequest};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ca::{AuthorityName, CaError, CertificateAuthorityCore, EnrollmentIdentity};

/// Error type for request verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required field: {0}")]
    MissingField(RequiredField),

    #[error("Signature does not verify")]
    SignatureInvalid,

    #[error("Enrollment certificate malformed: {0}")]
    MalformedCertificate(String),

    /// The peer root could not be loaded; not the caller's fault
    #[error(transparent)]
    TrustRoot(CaError),
}

/// Caller recovered from a verified request
#[derive(Debug, Clone)]
pub struct VerifiedCaller {
    pub identity: EnrollmentIdentity,
    pub enrollment_cert: ParsedCertificate,
}

impl VerifiedCaller {
    pub fn owner(&self) -> AttributeOwner {
        AttributeOwner::new(self.identity.id.clone(), self.identity.affiliation.clone())
    }
}

/// Verifies signed requests against a peer authority's root
#[derive(Debug, Clone)]
pub struct RequestVerifier {
    ca: Arc<dyn CertificateAuthorityCore>,
}

impl RequestVerifier {
    pub fn new(ca: Arc<dyn CertificateAuthorityCore>) -> Self {
        Self { ca }
    }

    /// Verify `request` against `authority`'s root key
    ///
    /// On return the request's signature field is cleared, whatever the
    /// outcome past the presence check.
    pub fn verify<P: SignedRequest>(
        &self,
        request: &mut P,
        authority: AuthorityName,
    ) -> Result<VerifiedCaller, VerificationError> {
        if let Some(field) = request.missing_field() {
            return Err(VerificationError::MissingField(field));
        }

        let (signature, signed_bytes) =
            detach_signature(request).map_err(|_| VerificationError::MissingField(RequiredField::Signature))?;

        let root = self
            .ca
            .root_certificate(authority)
            .map_err(VerificationError::TrustRoot)?;
        let root_key = ParsedCertificate::from_der(&root)
            .and_then(|cert| cert.public_key())
            .map_err(|e| {
                VerificationError::TrustRoot(CaError::InvalidRoot {
                    authority,
                    reason: e.to_string(),
                })
            })?;

        if let Err(err) = root_key.verify(&signed_bytes, &signature) {
            warn!(authority = %authority, error = %err, "Request signature does not verify");
            return Err(VerificationError::SignatureInvalid);
        }

        let raw_cert = request
            .enrollment_cert()
            .ok_or(VerificationError::MissingField(RequiredField::EnrollmentCert))?;
        let enrollment_cert = ParsedCertificate::from_der(raw_cert).map_err(|e| {
            warn!(error = %e, "Enrollment certificate does not parse");
            VerificationError::MalformedCertificate(e.to_string())
        })?;
        let common_name = enrollment_cert
            .common_name()
            .map_err(|e| VerificationError::MalformedCertificate(e.to_string()))?;
        let identity = self.ca.parse_enrollment_identity(&common_name).map_err(|e| {
            warn!(common_name = %common_name, "Enrollment certificate has no valid enrollment id");
            VerificationError::MalformedCertificate(e.to_string())
        })?;

        debug!(
            id = %identity.id,
            affiliation = %identity.affiliation,
            authority = %authority,
            "Request verified"
        );

        Ok(VerifiedCaller {
            identity,
            enrollment_cert,
        })
    }
}
