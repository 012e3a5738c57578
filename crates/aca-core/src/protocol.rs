//! Wire payloads of the ACA protocol
//!
//! Three operations are exposed:
//!
//! - `FetchAttributes`: refresh the caller's attributes; signed by the caller
//!   and checked against the enrollment authority's root
//! - `RequestAttributes`: issue an attribute certificate; checked against the
//!   transaction authority's root, and the response is signed by the ACA
//! - `ReadRootCertificate`: return the ACA's own certificate, unauthenticated
//!
//! Binary fields are base64 in JSON. Optional fields serialize as `null`
//! rather than being skipped so the signing bytes are stable.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{EcdsaSignature, SignedPayload};

/// A field every signed request must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Timestamp,
    Id,
    EnrollmentCert,
    Signature,
}

impl std::fmt::Display for RequiredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RequiredField::Timestamp => "timestamp",
            RequiredField::Id => "id",
            RequiredField::EnrollmentCert => "enrollment_cert",
            RequiredField::Signature => "signature",
        };
        f.write_str(name)
    }
}

/// A request signed by the caller over its own enrollment certificate
pub trait SignedRequest: SignedPayload {
    fn timestamp(&self) -> Option<DateTime<Utc>>;

    fn enrollment_cert(&self) -> Option<&[u8]>;

    /// First required field that is absent, in check order
    fn missing_field(&self) -> Option<RequiredField> {
        if self.timestamp().is_none() {
            Some(RequiredField::Timestamp)
        } else if self.enrollment_cert().is_none() {
            Some(RequiredField::EnrollmentCert)
        } else if self.signature().is_none() {
            Some(RequiredField::Signature)
        } else {
            None
        }
    }
}

/// `FetchAttributes` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAttributesRequest {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, with = "serde_opt_bytes_base64")]
    pub enrollment_cert: Option<Vec<u8>>,
    #[serde(default)]
    pub signature: Option<EcdsaSignature>,
}

impl FetchAttributesRequest {
    /// Unsigned request stamped with the current time
    pub fn new(enrollment_cert: Vec<u8>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            enrollment_cert: Some(enrollment_cert),
            signature: None,
        }
    }
}

impl SignedPayload for FetchAttributesRequest {
    fn signature(&self) -> Option<&EcdsaSignature> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: Option<EcdsaSignature>) {
        self.signature = signature;
    }
}

impl SignedRequest for FetchAttributesRequest {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn enrollment_cert(&self) -> Option<&[u8]> {
        self.enrollment_cert.as_deref()
    }
}

/// Outcome of `FetchAttributes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStatus {
    Success,
    Failure,
}

/// `FetchAttributes` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAttributesResponse {
    pub status: FetchStatus,
    pub message: String,
}

impl FetchAttributesResponse {
    pub fn success() -> Self {
        Self {
            status: FetchStatus::Success,
            message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: FetchStatus::Failure,
            message: message.into(),
        }
    }
}

/// `RequestAttributes` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAttributesRequest {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Caller identity as claimed by the client
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, with = "serde_opt_bytes_base64")]
    pub enrollment_cert: Option<Vec<u8>>,
    /// Requested attribute names, in order
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub signature: Option<EcdsaSignature>,
}

impl RequestAttributesRequest {
    /// Unsigned request stamped with the current time
    pub fn new(id: impl Into<String>, enrollment_cert: Vec<u8>, attributes: Vec<String>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            id: Some(id.into()),
            enrollment_cert: Some(enrollment_cert),
            attributes,
            signature: None,
        }
    }

    /// First attribute name that appears more than once
    pub fn duplicate_attribute(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.attributes.len());
        self.attributes
            .iter()
            .find(|name| !seen.insert(name.as_str()))
            .map(String::as_str)
    }
}

impl SignedPayload for RequestAttributesRequest {
    fn signature(&self) -> Option<&EcdsaSignature> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: Option<EcdsaSignature>) {
        self.signature = signature;
    }
}

impl SignedRequest for RequestAttributesRequest {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn enrollment_cert(&self) -> Option<&[u8]> {
        self.enrollment_cert.as_deref()
    }

    fn missing_field(&self) -> Option<RequiredField> {
        if self.timestamp.is_none() {
            Some(RequiredField::Timestamp)
        } else if self.id.is_none() {
            Some(RequiredField::Id)
        } else if self.enrollment_cert.is_none() {
            Some(RequiredField::EnrollmentCert)
        } else if self.signature.is_none() {
            Some(RequiredField::Signature)
        } else {
            None
        }
    }
}

/// Outcome of `RequestAttributes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeStatus {
    /// Every requested attribute matched
    FullSuccess,
    /// Some, but not all, requested attributes matched
    PartialSuccess,
    /// None of the requested attributes matched
    NoAttributesFound,
    /// Duplicate attribute names in the request
    BadRequest,
    FailNilTs,
    FailNilId,
    FailNilEcert,
    FailNilSignature,
    Failure,
}

impl AttributeStatus {
    /// Status reported when `field` is absent from a request
    pub fn for_missing(field: RequiredField) -> Self {
        match field {
            RequiredField::Timestamp => AttributeStatus::FailNilTs,
            RequiredField::Id => AttributeStatus::FailNilId,
            RequiredField::EnrollmentCert => AttributeStatus::FailNilEcert,
            RequiredField::Signature => AttributeStatus::FailNilSignature,
        }
    }

    /// Classify an issuance by how many of the requested names matched
    pub fn classify(requested: usize, matched: usize) -> Self {
        if matched == requested {
            AttributeStatus::FullSuccess
        } else if matched == 0 {
            AttributeStatus::NoAttributesFound
        } else {
            AttributeStatus::PartialSuccess
        }
    }

    /// Whether a certificate accompanies this status
    pub fn is_issued(&self) -> bool {
        matches!(
            self,
            AttributeStatus::FullSuccess | AttributeStatus::PartialSuccess | AttributeStatus::NoAttributesFound
        )
    }
}

/// `RequestAttributes` response, signed by the ACA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAttributesResponse {
    pub status: AttributeStatus,
    #[serde(default, with = "serde_opt_bytes_base64")]
    pub certificate: Option<Vec<u8>>,
    #[serde(default)]
    pub signature: Option<EcdsaSignature>,
}

impl RequestAttributesResponse {
    /// Unsigned response without a certificate
    pub fn status(status: AttributeStatus) -> Self {
        Self {
            status,
            certificate: None,
            signature: None,
        }
    }

    /// Unsigned response carrying an issued certificate
    pub fn issued(status: AttributeStatus, certificate: Vec<u8>) -> Self {
        Self {
            status,
            certificate: Some(certificate),
            signature: None,
        }
    }
}

impl SignedPayload for RequestAttributesResponse {
    fn signature(&self) -> Option<&EcdsaSignature> {
        self.signature.as_ref()
    }

    fn set_signature(&mut self, signature: Option<EcdsaSignature>) {
        self.signature = signature;
    }
}

/// `ReadRootCertificate` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCertificateResponse {
    #[serde(with = "serde_bytes_base64")]
    pub certificate: Vec<u8>,
}

mod serde_bytes_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

mod serde_opt_bytes_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| STANDARD.decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{detach_signature, KeyPair};

    fn request(attributes: &[&str]) -> RequestAttributesRequest {
        RequestAttributesRequest::new(
            "u1",
            b"ecert".to_vec(),
            attributes.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[test]
    fn test_missing_fields_checked_in_order() {
        let mut req = request(&["title"]);
        req.timestamp = None;
        req.id = None;
        assert_eq!(req.missing_field(), Some(RequiredField::Timestamp));

        let mut req = request(&["title"]);
        req.id = None;
        req.enrollment_cert = None;
        assert_eq!(req.missing_field(), Some(RequiredField::Id));

        let mut req = request(&["title"]);
        req.enrollment_cert = None;
        assert_eq!(req.missing_field(), Some(RequiredField::EnrollmentCert));

        let req = request(&["title"]);
        assert_eq!(req.missing_field(), Some(RequiredField::Signature));
    }

    #[test]
    fn test_fetch_request_has_no_id_requirement() {
        let mut req = FetchAttributesRequest::new(b"ecert".to_vec());
        assert_eq!(req.missing_field(), Some(RequiredField::Signature));

        KeyPair::generate("eca").sign_payload(&mut req).unwrap();
        assert_eq!(req.missing_field(), None);
    }

    #[test]
    fn test_duplicate_attribute() {
        assert_eq!(request(&["a", "b", "a"]).duplicate_attribute(), Some("a"));
        assert_eq!(request(&["a", "b"]).duplicate_attribute(), None);
        assert_eq!(request(&[]).duplicate_attribute(), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(AttributeStatus::classify(2, 2), AttributeStatus::FullSuccess);
        assert_eq!(AttributeStatus::classify(2, 1), AttributeStatus::PartialSuccess);
        assert_eq!(AttributeStatus::classify(2, 0), AttributeStatus::NoAttributesFound);
        assert_eq!(AttributeStatus::classify(0, 0), AttributeStatus::FullSuccess);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&AttributeStatus::FullSuccess).unwrap(), "\"FULL_SUCCESS\"");
        assert_eq!(serde_json::to_string(&AttributeStatus::FailNilTs).unwrap(), "\"FAIL_NIL_TS\"");
        assert_eq!(
            serde_json::to_string(&AttributeStatus::NoAttributesFound).unwrap(),
            "\"NO_ATTRIBUTES_FOUND\""
        );
    }

    #[test]
    fn test_signature_serializes_as_null_when_detached() {
        let kp = KeyPair::generate("tca");
        let mut req = request(&["title"]);
        kp.sign_payload(&mut req).unwrap();

        let (_, bytes) = detach_signature(&mut req).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["signature"].is_null());
        assert_eq!(json["enrollment_cert"], "ZWNlcnQ=");
    }

    #[test]
    fn test_signed_request_survives_json_transport() {
        let kp = KeyPair::generate("tca");
        let mut req = request(&["title", "clearance"]);
        kp.sign_payload(&mut req).unwrap();

        let wire = serde_json::to_string(&req).unwrap();
        let received: RequestAttributesRequest = serde_json::from_str(&wire).unwrap();
        assert!(kp.public_key().verify_payload(&received).is_ok());
    }

    #[test]
    fn test_absent_fields_deserialize_as_none() {
        let req: RequestAttributesRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.missing_field(), Some(RequiredField::Timestamp));
        assert!(req.attributes.is_empty());
    }

    #[test]
    fn test_response_signature_roundtrip() {
        let kp = KeyPair::generate("aca");
        let mut resp = RequestAttributesResponse::issued(AttributeStatus::FullSuccess, vec![1, 2, 3]);
        kp.sign_payload(&mut resp).unwrap();

        let received: RequestAttributesResponse =
            serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();
        assert!(kp.public_key().verify_payload(&received).is_ok());
        assert_eq!(received.certificate, Some(vec![1, 2, 3]));
    }
}
