//! # ACA Core
//!
//! Core types and cryptographic primitives for an Attribute Certificate
//! Authority: a service that binds verified identity attributes (job title,
//! clearance level) to short-lived certificates on request.
//!
//! ## Key Concepts
//!
//! - **Attribute record**: a named, valued fact about an `(id, affiliation)`
//!   owner, valid over a half-open time window
//! - **Signed payload**: a protocol message carrying a detached ECDSA P-256
//!   signature over the SHA3-256 digest of its canonical JSON form
//! - **Attribute extension**: a DER-encoded attribute embedded in an issued
//!   X.509 certificate under the `1.2.3.4.5.6` arc
//!
//! ## Protocol Invariants
//!
//! 1. **Detach before hashing**: a signature is removed from the payload
//!    before the payload is serialized for verification
//! 2. **Two trust roots**: refresh requests are verified against the
//!    enrollment authority, issuance requests against the transaction authority
//! 3. **Newest wins**: a stored attribute is only replaced by one with a
//!    strictly later `valid_from`

pub mod attribute;
pub mod certificate;
pub mod crypto;
pub mod error;
pub mod extension;
pub mod protocol;

pub use attribute::{AttributeKey, AttributeOwner, AttributeRecord};
pub use certificate::{CertificateSpec, ParsedCertificate};
pub use crypto::{detach_signature, EcdsaSignature, KeyPair, PublicKey, SignedPayload};
pub use error::{AcaError, Result};
pub use extension::{attribute_extensions, attribute_oid, is_attribute_oid, AttributeClaim};
pub use protocol::{
    AttributeStatus, FetchAttributesRequest, FetchAttributesResponse, FetchStatus, RequestAttributesRequest,
    RequestAttributesResponse, RequiredField, RootCertificateResponse, SignedRequest,
};

/// Re-exported so dependents name certificate types without a direct dependency
pub use x509_cert;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
