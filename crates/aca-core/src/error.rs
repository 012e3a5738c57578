//! Error types for the Attribute Certificate Authority core

use thiserror::Error;

/// Result type alias using AcaError
pub type Result<T> = std::result::Result<T, AcaError>;

/// Errors that can occur in the ACA core
#[derive(Error, Debug)]
pub enum AcaError {
    /// Raw attribute tuple could not be turned into a record
    #[error("Invalid attribute entry: {0}")]
    InvalidAttribute(String),

    /// A validity bound was not a valid RFC 3339 timestamp
    #[error("Invalid attribute date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    /// ECDSA signature did not verify
    #[error("Signature does not verify")]
    SignatureInvalid,

    /// Signature components could not be decoded
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Payload carried no signature to verify
    #[error("Missing signature")]
    MissingSignature,

    /// Certificate could not be parsed or built
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// ASN.1 DER encoding/decoding error
    #[error("DER error: {0}")]
    Der(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

impl From<p256::ecdsa::Error> for AcaError {
    fn from(err: p256::ecdsa::Error) -> Self {
        AcaError::CryptoError(err.to_string())
    }
}

impl From<serde_json::Error> for AcaError {
    fn from(err: serde_json::Error) -> Self {
        AcaError::SerializationError(err.to_string())
    }
}

impl From<der::Error> for AcaError {
    fn from(err: der::Error) -> Self {
        AcaError::Der(err.to_string())
    }
}

impl From<p256::pkcs8::spki::Error> for AcaError {
    fn from(err: p256::pkcs8::spki::Error) -> Self {
        AcaError::CryptoError(err.to_string())
    }
}

impl From<p256::pkcs8::Error> for AcaError {
    fn from(err: p256::pkcs8::Error) -> Self {
        AcaError::CryptoError(err.to_string())
    }
}
