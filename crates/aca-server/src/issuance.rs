//! Attribute certificate issuance
//!
//! `RequestAttributes` runs as a single pass with terminal outcomes only:
//!
//! 1. shape checks: missing fields, then duplicate attribute names
//! 2. verification against the transaction authority root
//! 3. refresh of the caller's attributes from the source
//! 4. lookup of each requested name, filtered by the [`MatchPolicy`]
//! 5. one attribute extension per match, in request order
//! 6. a certificate for the caller's key, issued even with no matches
//! 7. classification, then a response signed with the authority key
//!
//! Request problems end in a status. Only infrastructure faults (trust root
//! missing, store or source unreachable) escape as [`IssuanceFault`].

use aca_core::{
    attribute_extensions, AttributeRecord, AttributeStatus, CertificateSpec, FetchAttributesRequest,
    FetchAttributesResponse, RequestAttributesRequest, RequestAttributesResponse, RootCertificateResponse,
    SignedRequest,
};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::ca::{sign_payload, AuthorityName, CaError, CertificateAuthorityCore};
use crate::refresh::{RefreshError, RefreshPipeline};
use crate::storage::StorageError;
use crate::verifier::{RequestVerifier, VerificationError};

/// Default lifetime of an issued attribute certificate
pub const DEFAULT_CERT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Which stored attributes count as a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Only records valid at the time of the request
    #[default]
    CurrentlyValid,
    /// Any stored record, regardless of its validity window
    Stored,
}

impl MatchPolicy {
    pub fn matches(&self, record: &AttributeRecord, now: DateTime<Utc>) -> bool {
        match self {
            MatchPolicy::CurrentlyValid => record.valid_for(now),
            MatchPolicy::Stored => true,
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid-now" => Ok(MatchPolicy::CurrentlyValid),
            "stored" => Ok(MatchPolicy::Stored),
            other => Err(format!("unknown match policy '{}', expected 'valid-now' or 'stored'", other)),
        }
    }
}

/// Infrastructure fault that prevents any meaningful response
#[derive(Debug, thiserror::Error)]
pub enum IssuanceFault {
    #[error("Trust root unavailable: {0}")]
    TrustRoot(#[source] CaError),

    #[error("Attribute refresh unavailable: {0}")]
    Refresh(#[source] RefreshError),

    #[error("Attribute store unavailable: {0}")]
    Storage(#[source] StorageError),
}

/// Orchestrates verification, refresh, matching and issuance
#[derive(Debug, Clone)]
pub struct IssuancePipeline {
    ca: Arc<dyn CertificateAuthorityCore>,
    verifier: RequestVerifier,
    refresh: RefreshPipeline,
    policy: MatchPolicy,
    validity: Duration,
}

impl IssuancePipeline {
    pub fn new(ca: Arc<dyn CertificateAuthorityCore>, refresh: RefreshPipeline) -> Self {
        Self {
            verifier: RequestVerifier::new(ca.clone()),
            ca,
            refresh,
            policy: MatchPolicy::default(),
            validity: DEFAULT_CERT_VALIDITY,
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn authority(&self) -> &Arc<dyn CertificateAuthorityCore> {
        &self.ca
    }

    /// Handle `RequestAttributes`
    pub async fn request_attributes(
        &self,
        mut request: RequestAttributesRequest,
    ) -> Result<RequestAttributesResponse, IssuanceFault> {
        if let Some(field) = request.missing_field() {
            warn!(field = %field, "RequestAttributes rejected: missing field");
            return Ok(self.respond(AttributeStatus::for_missing(field), None));
        }
        if let Some(name) = request.duplicate_attribute() {
            warn!(attribute = %name, "RequestAttributes rejected: duplicate attribute name");
            return Ok(self.respond(AttributeStatus::BadRequest, None));
        }

        let caller = match self.verifier.verify(&mut request, AuthorityName::Tca) {
            Ok(caller) => caller,
            Err(VerificationError::TrustRoot(err)) => return Err(IssuanceFault::TrustRoot(err)),
            Err(err) => {
                warn!(error = %err, "RequestAttributes rejected");
                return Ok(self.respond(AttributeStatus::Failure, None));
            }
        };
        let owner = caller.owner();

        if let Err(err) = self.refresh.refresh(owner.id(), owner.affiliation()).await {
            if err.is_infrastructure() {
                return Err(IssuanceFault::Refresh(err));
            }
            error!(id = %owner.id(), affiliation = %owner.affiliation(), error = %err, "Attribute refresh failed");
            return Ok(self.respond(AttributeStatus::Failure, None));
        }

        let now = Utc::now();
        let mut matched = Vec::with_capacity(request.attributes.len());
        for name in &request.attributes {
            match self.refresh.store().find(&owner, name).await {
                Ok(Some(record)) if self.policy.matches(&record, now) => matched.push(record),
                Ok(_) => {}
                Err(err) if err.is_infrastructure() => return Err(IssuanceFault::Storage(err)),
                Err(err) => {
                    error!(attribute = %name, error = %err, "Attribute lookup failed");
                    return Ok(self.respond(AttributeStatus::Failure, None));
                }
            }
        }

        let extensions = match attribute_extensions(&matched) {
            Ok(extensions) => extensions,
            Err(err) => {
                error!(error = %err, "Attribute extension encoding failed");
                return Ok(self.respond(AttributeStatus::Failure, None));
            }
        };

        let spec = CertificateSpec::new(
            owner.id(),
            caller.enrollment_cert.subject_public_key_info().clone(),
            self.validity,
        )
        .with_key_usage(caller.enrollment_cert.key_usage().cloned())
        .with_extensions(extensions);

        let certificate = match self.ca.new_certificate(&spec) {
            Ok(certificate) => certificate,
            Err(err) => {
                error!(id = %owner.id(), error = %err, "Certificate issuance failed");
                return Ok(self.respond(AttributeStatus::Failure, None));
            }
        };

        let status = AttributeStatus::classify(request.attributes.len(), matched.len());
        info!(
            id = %owner.id(),
            affiliation = %owner.affiliation(),
            requested = request.attributes.len(),
            matched = matched.len(),
            status = ?status,
            "Issued attribute certificate"
        );

        Ok(self.respond(status, Some(certificate)))
    }

    /// Handle `FetchAttributes`
    pub async fn fetch_attributes(
        &self,
        mut request: FetchAttributesRequest,
    ) -> Result<FetchAttributesResponse, IssuanceFault> {
        let caller = match self.verifier.verify(&mut request, AuthorityName::Eca) {
            Ok(caller) => caller,
            Err(VerificationError::MissingField(field)) => {
                warn!(field = %field, "FetchAttributes rejected: missing field");
                return Ok(FetchAttributesResponse::failure("Bad request"));
            }
            Err(VerificationError::SignatureInvalid) => {
                return Ok(FetchAttributesResponse::failure("Signature does not verify"));
            }
            Err(VerificationError::MalformedCertificate(_)) => {
                return Ok(FetchAttributesResponse::failure("Certificate malformed"));
            }
            Err(VerificationError::TrustRoot(err)) => return Err(IssuanceFault::TrustRoot(err)),
        };
        let owner = caller.owner();

        match self.refresh.refresh(owner.id(), owner.affiliation()).await {
            Ok(_) => Ok(FetchAttributesResponse::success()),
            Err(err) if err.is_infrastructure() => Err(IssuanceFault::Refresh(err)),
            Err(err) => {
                error!(id = %owner.id(), affiliation = %owner.affiliation(), error = %err, "Attribute refresh failed");
                Ok(FetchAttributesResponse::failure("Attribute refresh failed"))
            }
        }
    }

    /// Handle `ReadRootCertificate`
    pub fn read_root_certificate(&self) -> RootCertificateResponse {
        RootCertificateResponse {
            certificate: self.ca.certificate().to_vec(),
        }
    }

    /// Build and sign a response; an unsignable response degrades to an
    /// unsigned generic failure
    fn respond(&self, status: AttributeStatus, certificate: Option<Vec<u8>>) -> RequestAttributesResponse {
        let mut response = match certificate {
            Some(certificate) => RequestAttributesResponse::issued(status, certificate),
            None => RequestAttributesResponse::status(status),
        };
        match sign_payload(self.ca.as_ref(), &mut response) {
            Ok(()) => response,
            Err(err) => {
                error!(error = %err, status = ?status, "Could not sign response");
                RequestAttributesResponse::status(AttributeStatus::Failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::{EnrollmentIdentity, LocalAuthority};
    use crate::source::StaticAttributeSource;
    use crate::storage::MemoryStore;
    use aca_core::certificate::{common_name, issue};
    use aca_core::{EcdsaSignature, KeyPair, ParsedCertificate};

    /// Authority whose signing key is unusable
    #[derive(Debug)]
    struct BrokenSigner(LocalAuthority);

    impl CertificateAuthorityCore for BrokenSigner {
        fn kid(&self) -> &str {
            self.0.kid()
        }

        fn root_certificate(&self, authority: AuthorityName) -> Result<Vec<u8>, CaError> {
            self.0.root_certificate(authority)
        }

        fn certificate(&self) -> &[u8] {
            self.0.certificate()
        }

        fn new_certificate(&self, spec: &CertificateSpec) -> Result<Vec<u8>, CaError> {
            self.0.new_certificate(spec)
        }

        fn parse_enrollment_identity(&self, common_name: &str) -> Result<EnrollmentIdentity, CaError> {
            self.0.parse_enrollment_identity(common_name)
        }

        fn sign(&self, _message: &[u8]) -> Result<EcdsaSignature, CaError> {
            Err(CaError::Signing("key unavailable".into()))
        }
    }

    fn signed_request(tca: &KeyPair, eca: &KeyPair, attributes: &[&str]) -> RequestAttributesRequest {
        let user = KeyPair::generate("user");
        let spec = CertificateSpec::new(
            "u1\\client\\org1",
            user.public_key().to_spki().unwrap(),
            Duration::from_secs(3600),
        );
        let ecert = issue(&spec, &common_name("ECA").unwrap(), eca).unwrap();
        let mut req = RequestAttributesRequest::new("u1", ecert, attributes.iter().map(|a| a.to_string()).collect());
        tca.sign_payload(&mut req).unwrap();
        req
    }

    fn authority(eca: &KeyPair, tca: &KeyPair, aca: KeyPair) -> LocalAuthority {
        let eca_ca = LocalAuthority::self_signed(eca.clone(), "ECA").unwrap();
        let tca_ca = LocalAuthority::self_signed(tca.clone(), "TCA").unwrap();
        LocalAuthority::self_signed(aca, "ACA")
            .unwrap()
            .with_peer(AuthorityName::Eca, eca_ca.certificate().to_vec())
            .with_peer(AuthorityName::Tca, tca_ca.certificate().to_vec())
    }

    fn refresh(entries: &[&str]) -> RefreshPipeline {
        RefreshPipeline::new(
            Arc::new(StaticAttributeSource::from_entries(entries)),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn test_match_policy_from_str() {
        assert_eq!("valid-now".parse::<MatchPolicy>().unwrap(), MatchPolicy::CurrentlyValid);
        assert_eq!("stored".parse::<MatchPolicy>().unwrap(), MatchPolicy::Stored);
        assert!("sometimes".parse::<MatchPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_full_success() {
        let (eca, tca, aca) = (KeyPair::generate("eca"), KeyPair::generate("tca"), KeyPair::generate("aca"));
        let pipeline = IssuancePipeline::new(
            Arc::new(authority(&eca, &tca, aca.clone())),
            refresh(&["u1;org1;title;engineer;2020-01-01T00:00:00Z;"]),
        );

        let response = pipeline
            .request_attributes(signed_request(&tca, &eca, &["title"]))
            .await
            .unwrap();

        assert_eq!(response.status, AttributeStatus::FullSuccess);
        assert!(aca.public_key().verify_payload(&response).is_ok());

        let cert = ParsedCertificate::from_der(response.certificate.as_deref().unwrap()).unwrap();
        assert_eq!(cert.common_name().unwrap(), "u1");
        assert_eq!(cert.attributes().unwrap()[0].value, b"engineer");
    }

    #[tokio::test]
    async fn test_signing_failure_degrades_to_unsigned_failure() {
        let (eca, tca) = (KeyPair::generate("eca"), KeyPair::generate("tca"));
        let broken = BrokenSigner(authority(&eca, &tca, KeyPair::generate("aca")));
        let pipeline = IssuancePipeline::new(Arc::new(broken), refresh(&["u1;org1;title;engineer;;"]));

        let response = pipeline
            .request_attributes(signed_request(&tca, &eca, &["title"]))
            .await
            .unwrap();

        assert_eq!(response.status, AttributeStatus::Failure);
        assert!(response.certificate.is_none());
        assert!(response.signature.is_none());
    }

    #[tokio::test]
    async fn test_missing_trust_root_is_a_fault() {
        let (eca, tca) = (KeyPair::generate("eca"), KeyPair::generate("tca"));
        let aca = LocalAuthority::self_signed(KeyPair::generate("aca"), "ACA").unwrap();
        let pipeline = IssuancePipeline::new(Arc::new(aca), refresh(&[]));

        let result = pipeline.request_attributes(signed_request(&tca, &eca, &["title"])).await;
        assert!(matches!(result, Err(IssuanceFault::TrustRoot(_))));
    }

    #[tokio::test]
    async fn test_bad_feed_is_a_signed_failure() {
        let (eca, tca, aca) = (KeyPair::generate("eca"), KeyPair::generate("tca"), KeyPair::generate("aca"));
        let pipeline = IssuancePipeline::new(
            Arc::new(authority(&eca, &tca, aca.clone())),
            refresh(&["u1;org1;title;engineer;last tuesday;"]),
        );

        let response = pipeline
            .request_attributes(signed_request(&tca, &eca, &["title"]))
            .await
            .unwrap();

        assert_eq!(response.status, AttributeStatus::Failure);
        assert!(response.certificate.is_none());
        assert!(aca.public_key().verify_payload(&response).is_ok());
    }

    #[test]
    fn test_read_root_certificate() {
        let aca = LocalAuthority::self_signed(KeyPair::generate("aca"), "ACA").unwrap();
        let expected = aca.certificate().to_vec();
        let pipeline = IssuancePipeline::new(Arc::new(aca), refresh(&[]));

        assert_eq!(pipeline.read_root_certificate().certificate, expected);
    }
}
