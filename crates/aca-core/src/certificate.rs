//! X.509 certificate assembly and parsing
//!
//! Authorities issue certificates signed with ECDSA P-256 over SHA-256.
//! Subjects carry a single common name encoded as a UTF8String; enrollment
//! common names embed `id\role\affiliation`, which is why names are built
//! directly from attribute values rather than parsed from RFC 4514 text.

use std::time::Duration;

use const_oid::ObjectIdentifier;
use der::asn1::{BitString, SetOfVec};
use der::{Any, Decode, DecodePem, Encode, Tag};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{DerSignature, Signature};
use rand::RngCore;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;
use x509_cert::{Certificate, TbsCertificate, Version};

use crate::crypto::{KeyPair, PublicKey};
use crate::error::{AcaError, Result};
use crate::extension::{decode_attribute_extension, AttributeClaim};

/// ecdsa-with-SHA256
pub const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// id-at-commonName
pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// id-ce-keyUsage
pub const KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// id-ce-basicConstraints
pub const BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");

const SERIAL_LEN: usize = 16;

/// Everything needed to issue a certificate besides the issuer itself
#[derive(Debug, Clone)]
pub struct CertificateSpec {
    /// Subject common name
    pub common_name: String,
    pub public_key: SubjectPublicKeyInfoOwned,
    /// Key-usage extension copied into the certificate as-is
    pub key_usage: Option<Extension>,
    /// Additional extensions, appended after key usage
    pub extensions: Vec<Extension>,
    pub validity: Duration,
}

impl CertificateSpec {
    pub fn new(common_name: impl Into<String>, public_key: SubjectPublicKeyInfoOwned, validity: Duration) -> Self {
        Self {
            common_name: common_name.into(),
            public_key,
            key_usage: None,
            extensions: Vec::new(),
            validity,
        }
    }

    pub fn with_key_usage(mut self, key_usage: Option<Extension>) -> Self {
        self.key_usage = key_usage;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Distinguished name holding a single UTF8String common name
pub fn common_name(cn: &str) -> Result<Name> {
    let value = AttributeTypeAndValue {
        oid: COMMON_NAME,
        value: Any::new(Tag::Utf8String, cn.as_bytes())?,
    };
    let rdn = RelativeDistinguishedName(SetOfVec::try_from(vec![value])?);
    Ok(RdnSequence(vec![rdn]))
}

/// Issue a certificate for `spec`, signed by `issuer_key` under `issuer`
pub fn issue(spec: &CertificateSpec, issuer: &Name, issuer_key: &KeyPair) -> Result<Vec<u8>> {
    let mut extensions = Vec::with_capacity(spec.extensions.len() + 1);
    if let Some(key_usage) = &spec.key_usage {
        extensions.push(key_usage.clone());
    }
    extensions.extend(spec.extensions.iter().cloned());

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: random_serial()?,
        signature: signature_algorithm(),
        issuer: issuer.clone(),
        validity: Validity::from_now(spec.validity)?,
        subject: common_name(&spec.common_name)?,
        subject_public_key_info: spec.public_key.clone(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: if extensions.is_empty() { None } else { Some(extensions) },
    };

    sign_tbs(tbs, issuer_key)
}

/// Self-signed CA certificate for an authority's own key
pub fn self_signed(cn: &str, key: &KeyPair, validity: Duration) -> Result<Vec<u8>> {
    let constraints = BasicConstraints {
        ca: true,
        path_len_constraint: None,
    };
    let ca_extension = Extension {
        extn_id: BASIC_CONSTRAINTS,
        critical: true,
        extn_value: der::asn1::OctetString::new(constraints.to_der()?)?,
    };
    let spec = CertificateSpec::new(cn, key.public_key().to_spki()?, validity).with_extensions(vec![ca_extension]);
    issue(&spec, &common_name(cn)?, key)
}

fn signature_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA256,
        parameters: None,
    }
}

fn random_serial() -> Result<SerialNumber> {
    let mut bytes = [0u8; SERIAL_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    // positive and non-zero
    bytes[0] &= 0x7f;
    bytes[0] |= 0x01;
    Ok(SerialNumber::new(&bytes)?)
}

fn sign_tbs(tbs: TbsCertificate, key: &KeyPair) -> Result<Vec<u8>> {
    let tbs_der = tbs.to_der()?;
    let signature: Signature = key.signing_key().try_sign(&tbs_der)?;
    let signature: DerSignature = signature.to_der();

    let certificate = Certificate {
        tbs_certificate: tbs,
        signature_algorithm: signature_algorithm(),
        signature: BitString::from_bytes(signature.as_bytes())?,
    };
    Ok(certificate.to_der()?)
}

/// A parsed X.509 certificate
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    inner: Certificate,
}

impl ParsedCertificate {
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let inner = Certificate::from_der(bytes).map_err(|e| AcaError::Certificate(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = Certificate::from_pem(pem).map_err(|e| AcaError::Certificate(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// First common name in the subject
    pub fn common_name(&self) -> Result<String> {
        self.subject()
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|atv| atv.oid == COMMON_NAME)
            .ok_or_else(|| AcaError::Certificate("subject has no common name".into()))
            .and_then(|atv| {
                String::from_utf8(atv.value.value().to_vec())
                    .map_err(|_| AcaError::Certificate("common name is not valid UTF-8".into()))
            })
    }

    pub fn subject_public_key_info(&self) -> &SubjectPublicKeyInfoOwned {
        &self.inner.tbs_certificate.subject_public_key_info
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_public_key_der(&self.subject_public_key_info().to_der()?)
    }

    pub fn extensions(&self) -> &[Extension] {
        self.inner.tbs_certificate.extensions.as_deref().unwrap_or(&[])
    }

    pub fn key_usage(&self) -> Option<&Extension> {
        self.extensions().iter().find(|ext| ext.extn_id == KEY_USAGE)
    }

    /// Decode every attribute extension in issue order
    pub fn attributes(&self) -> Result<Vec<AttributeClaim>> {
        let mut claims = Vec::new();
        for ext in self.extensions() {
            if let Some(claim) = decode_attribute_extension(ext)? {
                claims.push(claim);
            }
        }
        Ok(claims)
    }

    /// Check this certificate's signature against the issuer's key
    pub fn verify_issued_by(&self, issuer: &PublicKey) -> Result<()> {
        let tbs_der = self.inner.tbs_certificate.to_der()?;
        let raw = self
            .inner
            .signature
            .as_bytes()
            .ok_or_else(|| AcaError::Certificate("signature has unused bits".into()))?;
        let signature = Signature::from_der(raw).map_err(|e| AcaError::MalformedSignature(e.to_string()))?;
        issuer
            .verifying_key()
            .verify(&tbs_der, &signature)
            .map_err(|_| AcaError::SignatureInvalid)
    }
}
