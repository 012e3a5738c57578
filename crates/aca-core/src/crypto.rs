//! Cryptographic primitives for signed ACA payloads
//!
//! Every signed message in the ACA protocol carries a detached ECDSA P-256
//! signature whose `r` and `s` components travel as decimal text. The
//! signature covers the SHA3-256 digest of the payload's canonical JSON
//! encoding taken with the signature field blank.
//!
//! Key types:
//! - `KeyPair`: P-256 signing key held by an authority
//! - `PublicKey`: P-256 verifying key, usually taken from a root certificate
//! - `EcdsaSignature`: `(r, s)` in decimal text form
//! - `SignedPayload`: a message with a detachable signature field

use num_bigint::BigUint;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use x509_cert::der::Decode;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{AcaError, Result};

/// Size in bytes of one P-256 signature scalar
const SCALAR_LEN: usize = 32;

/// SHA3-256 digest of a message
pub fn digest(message: &[u8]) -> [u8; 32] {
    Sha3_256::digest(message).into()
}

/// ECDSA signature with `r` and `s` as decimal big-integer text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    pub r: String,
    pub s: String,
}

impl EcdsaSignature {
    fn from_signature(signature: &Signature) -> Self {
        let bytes = signature.to_bytes();
        let (r, s) = bytes.split_at(SCALAR_LEN);
        Self {
            r: BigUint::from_bytes_be(r).to_str_radix(10),
            s: BigUint::from_bytes_be(s).to_str_radix(10),
        }
    }

    fn to_signature(&self) -> Result<Signature> {
        let mut bytes = [0u8; SCALAR_LEN * 2];
        decode_scalar(&self.r, &mut bytes[..SCALAR_LEN])?;
        decode_scalar(&self.s, &mut bytes[SCALAR_LEN..])?;
        Signature::from_slice(&bytes).map_err(|e| AcaError::MalformedSignature(e.to_string()))
    }
}

fn decode_scalar(text: &str, out: &mut [u8]) -> Result<()> {
    let value = BigUint::parse_bytes(text.as_bytes(), 10)
        .ok_or_else(|| AcaError::MalformedSignature(format!("not a decimal integer: '{}'", text)))?;
    let raw = value.to_bytes_be();
    if raw.len() > out.len() {
        return Err(AcaError::MalformedSignature("scalar too large".into()));
    }
    let offset = out.len() - raw.len();
    out[offset..].copy_from_slice(&raw);
    Ok(())
}

/// A message that carries its own detachable signature
///
/// The bytes that get signed are the canonical JSON encoding of the message
/// with the signature field set to `None`.
pub trait SignedPayload: Serialize {
    fn signature(&self) -> Option<&EcdsaSignature>;

    fn set_signature(&mut self, signature: Option<EcdsaSignature>);

    /// Canonical bytes of the message in its current state
    fn to_signing_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(AcaError::from)
    }
}

/// Remove the signature from `payload` and return it together with the
/// bytes it was computed over.
///
/// The field is cleared before the payload is serialized, so the returned
/// bytes are exactly what the signer hashed.
pub fn detach_signature<P: SignedPayload>(payload: &mut P) -> Result<(EcdsaSignature, Vec<u8>)> {
    let signature = payload.signature().cloned().ok_or(AcaError::MissingSignature)?;
    payload.set_signature(None);
    let bytes = payload.to_signing_bytes()?;
    Ok((signature, bytes))
}

/// ECDSA P-256 key pair held by an authority
#[derive(Clone)]
pub struct KeyPair {
    /// Key identifier
    kid: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::from_signing_key(kid, SigningKey::random(&mut OsRng))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(kid: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key().clone();
        Self {
            kid: kid.into(),
            signing_key,
            verifying_key,
        }
    }

    /// Load a key pair from a PKCS#8 PEM document
    pub fn from_pkcs8_pem(kid: impl Into<String>, pem: &str) -> Result<Self> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)?;
        Ok(Self::from_signing_key(kid, signing_key))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.verifying_key.clone(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Sign the SHA3-256 digest of `message`
    pub fn sign(&self, message: &[u8]) -> Result<EcdsaSignature> {
        let signature: Signature = self.signing_key.sign_prehash(&digest(message))?;
        Ok(EcdsaSignature::from_signature(&signature))
    }

    /// Blank the payload's signature, sign its canonical bytes and attach
    /// the new signature.
    pub fn sign_payload<P: SignedPayload>(&self, payload: &mut P) -> Result<()> {
        payload.set_signature(None);
        let signature = self.sign(&payload.to_signing_bytes()?)?;
        payload.set_signature(Some(signature));
        Ok(())
    }
}

/// ECDSA P-256 public key for verification
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey").finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Decode a DER `SubjectPublicKeyInfo`
    pub fn from_public_key_der(der: &[u8]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_public_key_der(der)?;
        Ok(Self { verifying_key })
    }

    /// Encode as a DER `SubjectPublicKeyInfo`
    pub fn to_public_key_der(&self) -> Result<Vec<u8>> {
        Ok(self.verifying_key.to_public_key_der()?.as_bytes().to_vec())
    }

    /// Encode as an owned `SubjectPublicKeyInfo` for certificate building
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_der(&self.to_public_key_der()?)?)
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Verify a signature over a precomputed digest
    pub fn verify_digest(&self, digest: &[u8], signature: &EcdsaSignature) -> Result<()> {
        let signature = signature.to_signature()?;
        self.verifying_key
            .verify_prehash(digest, &signature)
            .map_err(|_| AcaError::SignatureInvalid)
    }

    /// Verify a signature over `message`
    pub fn verify(&self, message: &[u8], signature: &EcdsaSignature) -> Result<()> {
        self.verify_digest(&digest(message), signature)
    }

    /// Verify a signed payload without modifying it
    pub fn verify_payload<P: SignedPayload + Clone>(&self, payload: &P) -> Result<()> {
        let mut unsigned = payload.clone();
        let (signature, bytes) = detach_signature(&mut unsigned)?;
        self.verify(&bytes, &signature)
    }
}
