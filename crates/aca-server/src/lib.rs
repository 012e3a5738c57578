//! Attribute Certificate Authority Server
//!
//! The ACA binds verified identity attributes to short-lived certificates:
//! - Refreshes a caller's attributes from an external source into a
//!   transactional store
//! - Verifies each request against the peer authority that signed it
//! - Issues certificates carrying the requested attributes as extensions
//! - Signs every issuance outcome with its own key
//!
//! ## Trust Roots
//!
//! - **ECA** (enrollment authority) signs `FetchAttributes` requests
//! - **TCA** (transaction authority) signs `RequestAttributes` requests
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with authority key id
//! - `POST /v1/aca/attributes/fetch` - Refresh the caller's attributes
//! - `POST /v1/aca/attributes/request` - Issue an attribute certificate
//! - `GET /v1/aca/certificate` - The authority's own certificate

pub mod api;
pub mod ca;
pub mod config;
pub mod issuance;
pub mod refresh;
pub mod source;
pub mod storage;
pub mod verifier;

pub use api::create_router;
pub use api::handlers::AppState;
pub use ca::{AuthorityName, CertificateAuthorityCore, EnrollmentIdentity, LocalAuthority};
pub use config::AcaConfig;
pub use issuance::{IssuanceFault, IssuancePipeline, MatchPolicy};
pub use refresh::RefreshPipeline;
pub use source::{AttributeSource, FileAttributeSource, StaticAttributeSource};
pub use storage::{AttributeStore, MemoryStore, StorageError};
pub use verifier::{RequestVerifier, VerificationError};
