//! Certificate authority capability
//!
//! The attribute authority relies on generic CA machinery it does not own:
//! peer root certificates, certificate issuance, enrollment-id parsing and
//! signing with the authority key. [`CertificateAuthorityCore`] names that
//! capability; [`LocalAuthority`] implements it in-process. The private key
//! never leaves the implementation: callers get signatures, not key material.

use aca_core::certificate::{self, CertificateSpec, ParsedCertificate};
use aca_core::x509_cert::name::Name;
use aca_core::{AcaError, EcdsaSignature, KeyPair, SignedPayload};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::time::Duration;
use tracing::info;

/// Lifetime of a generated self-signed authority certificate
pub const ROOT_CERT_VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Separator between the sections of an enrollment id
pub const ENROLLMENT_ID_SEPARATOR: char = '\\';

/// Authorities whose roots the attribute authority knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityName {
    /// Enrollment certificate authority
    Eca,
    /// Transaction certificate authority
    Tca,
    /// This attribute certificate authority
    Aca,
}

impl fmt::Display for AuthorityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthorityName::Eca => "eca",
            AuthorityName::Tca => "tca",
            AuthorityName::Aca => "aca",
        };
        f.write_str(name)
    }
}

/// Error type for certificate authority operations
#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("Root certificate for '{0}' is not available")]
    RootUnavailable(AuthorityName),

    #[error("Root certificate for '{authority}' is invalid: {reason}")]
    InvalidRoot { authority: AuthorityName, reason: String },

    #[error("Invalid enrollment id '{0}': expected id\\role\\affiliation")]
    InvalidEnrollmentId(String),

    #[error("Certificate issuance failed: {0}")]
    Issuance(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl CaError {
    /// Whether the authority's trust configuration is broken
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, CaError::RootUnavailable(_) | CaError::InvalidRoot { .. })
    }
}

/// Caller identity recovered from an enrollment certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentIdentity {
    pub id: String,
    pub role: String,
    pub affiliation: String,
}

/// Split an enrollment id of the form `id\role\affiliation`
///
/// Sections past the third belong to the affiliation.
pub fn parse_enrollment_id(enrollment_id: &str) -> Result<EnrollmentIdentity, CaError> {
    let mut sections = enrollment_id.splitn(3, ENROLLMENT_ID_SEPARATOR);
    let (Some(id), Some(role), Some(affiliation)) = (sections.next(), sections.next(), sections.next()) else {
        return Err(CaError::InvalidEnrollmentId(enrollment_id.to_string()));
    };
    if id.is_empty() || affiliation.is_empty() {
        return Err(CaError::InvalidEnrollmentId(enrollment_id.to_string()));
    }
    Ok(EnrollmentIdentity {
        id: id.to_string(),
        role: role.to_string(),
        affiliation: affiliation.to_string(),
    })
}

/// Generic certificate authority operations used by the attribute authority
pub trait CertificateAuthorityCore: Send + Sync + Debug {
    /// Identifier of the authority's signing key
    fn kid(&self) -> &str;

    /// DER root certificate of a named authority
    fn root_certificate(&self, authority: AuthorityName) -> Result<Vec<u8>, CaError>;

    /// This authority's own DER certificate
    fn certificate(&self) -> &[u8];

    /// Issue a certificate from `spec`, signed by this authority
    fn new_certificate(&self, spec: &CertificateSpec) -> Result<Vec<u8>, CaError>;

    /// Recover `(id, role, affiliation)` from an enrollment common name
    fn parse_enrollment_identity(&self, common_name: &str) -> Result<EnrollmentIdentity, CaError> {
        parse_enrollment_id(common_name)
    }

    /// Sign `message` with the authority's private key
    fn sign(&self, message: &[u8]) -> Result<EcdsaSignature, CaError>;
}

/// Sign `payload` in place with the authority key
pub fn sign_payload<P: SignedPayload>(ca: &dyn CertificateAuthorityCore, payload: &mut P) -> Result<(), CaError> {
    payload.set_signature(None);
    let bytes = payload
        .to_signing_bytes()
        .map_err(|e| CaError::Signing(e.to_string()))?;
    let signature = ca.sign(&bytes)?;
    payload.set_signature(Some(signature));
    Ok(())
}

/// In-process certificate authority holding its own key and peer roots
pub struct LocalAuthority {
    key: KeyPair,
    subject: Name,
    certificate: Vec<u8>,
    peers: HashMap<AuthorityName, Vec<u8>>,
}

impl Debug for LocalAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAuthority")
            .field("kid", &self.key.kid())
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl LocalAuthority {
    /// Authority with a freshly issued self-signed certificate
    pub fn self_signed(key: KeyPair, common_name: &str) -> Result<Self, CaError> {
        let certificate = certificate::self_signed(common_name, &key, ROOT_CERT_VALIDITY)
            .map_err(|e| CaError::Issuance(e.to_string()))?;
        Self::with_certificate(key, certificate)
    }

    /// Authority using an existing certificate for `key`
    pub fn with_certificate(key: KeyPair, certificate: Vec<u8>) -> Result<Self, CaError> {
        let invalid = |e: AcaError| CaError::InvalidRoot {
            authority: AuthorityName::Aca,
            reason: e.to_string(),
        };
        let parsed = ParsedCertificate::from_der(&certificate).map_err(invalid)?;
        if parsed.public_key().map_err(invalid)? != key.public_key() {
            return Err(CaError::InvalidRoot {
                authority: AuthorityName::Aca,
                reason: "certificate does not match the authority key".into(),
            });
        }

        info!(kid = %key.kid(), "Certificate authority initialized");

        Ok(Self {
            key,
            subject: parsed.subject().clone(),
            certificate,
            peers: HashMap::new(),
        })
    }

    /// Register a peer authority's DER root certificate
    pub fn with_peer(mut self, authority: AuthorityName, certificate: Vec<u8>) -> Self {
        info!(authority = %authority, "Registered peer root certificate");
        self.peers.insert(authority, certificate);
        self
    }

    /// Register a peer authority's PEM root certificate
    pub fn with_peer_pem(self, authority: AuthorityName, pem: &str) -> Result<Self, CaError> {
        let der = ParsedCertificate::from_pem(pem)
            .and_then(|cert| cert.to_der())
            .map_err(|e| CaError::InvalidRoot {
                authority,
                reason: e.to_string(),
            })?;
        Ok(self.with_peer(authority, der))
    }
}

impl CertificateAuthorityCore for LocalAuthority {
    fn kid(&self) -> &str {
        self.key.kid()
    }

    fn root_certificate(&self, authority: AuthorityName) -> Result<Vec<u8>, CaError> {
        match authority {
            AuthorityName::Aca => Ok(self.certificate.clone()),
            peer => self.peers.get(&peer).cloned().ok_or(CaError::RootUnavailable(peer)),
        }
    }

    fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    fn new_certificate(&self, spec: &CertificateSpec) -> Result<Vec<u8>, CaError> {
        certificate::issue(spec, &self.subject, &self.key).map_err(|e| CaError::Issuance(e.to_string()))
    }

    fn sign(&self, message: &[u8]) -> Result<EcdsaSignature, CaError> {
        self.key.sign(message).map_err(|e| CaError::Signing(e.to_string()))
    }
}
