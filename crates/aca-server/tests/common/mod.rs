//! Shared fixtures: peer authorities, enrollment certificates and signed
//! requests.

#![allow(dead_code)]

use aca_core::certificate::{common_name, issue, KEY_USAGE};
use aca_core::x509_cert::der::asn1::OctetString;
use aca_core::x509_cert::ext::Extension;
use aca_core::{CertificateSpec, FetchAttributesRequest, KeyPair, RequestAttributesRequest};
use aca_server::{
    AuthorityName, CertificateAuthorityCore, IssuancePipeline, LocalAuthority, MatchPolicy, MemoryStore,
    RefreshPipeline, StaticAttributeSource,
};
use std::sync::Arc;
use std::time::Duration;

pub const ENROLLMENT_ID: &str = "u1\\client\\org1";

/// The attribute feed most tests run against
pub const FEED: &[&str] = &[
    "u1;org1;title;engineer;2020-01-01T00:00:00Z;",
    "u1;org1;clearance;secret;2020-01-01T00:00:00Z;2999-01-01T00:00:00Z",
    "u1;org1;badge;gold;2010-01-01T00:00:00Z;2011-01-01T00:00:00Z",
    "u1;org2;title;manager;;",
    "u2;org1;title;intern;;",
];

pub struct Harness {
    pub eca: KeyPair,
    pub tca: KeyPair,
    pub aca: KeyPair,
    pub user: KeyPair,
    pub authority: Arc<LocalAuthority>,
    pub store: Arc<MemoryStore>,
    pub pipeline: IssuancePipeline,
}

impl Harness {
    pub fn new(feed: &[&str]) -> Self {
        Self::with_policy(feed, MatchPolicy::CurrentlyValid)
    }

    pub fn with_policy(feed: &[&str], policy: MatchPolicy) -> Self {
        let eca = KeyPair::generate("eca");
        let tca = KeyPair::generate("tca");
        let aca = KeyPair::generate("aca");

        let eca_root = LocalAuthority::self_signed(eca.clone(), "ECA").unwrap();
        let tca_root = LocalAuthority::self_signed(tca.clone(), "TCA").unwrap();
        let authority = Arc::new(
            LocalAuthority::self_signed(aca.clone(), "ACA")
                .unwrap()
                .with_peer(AuthorityName::Eca, eca_root.certificate().to_vec())
                .with_peer(AuthorityName::Tca, tca_root.certificate().to_vec()),
        );

        let store = Arc::new(MemoryStore::new());
        let refresh = RefreshPipeline::new(Arc::new(StaticAttributeSource::from_entries(feed)), store.clone());
        let pipeline = IssuancePipeline::new(authority.clone(), refresh).with_policy(policy);

        Self {
            eca,
            tca,
            aca,
            user: KeyPair::generate("user"),
            authority,
            store,
            pipeline,
        }
    }

    /// Enrollment certificate for `cn`, issued by the ECA
    pub fn enrollment_cert(&self, cn: &str) -> Vec<u8> {
        let spec = CertificateSpec::new(cn, self.user.public_key().to_spki().unwrap(), Duration::from_secs(3600))
            .with_key_usage(Some(digital_signature()));
        issue(&spec, &common_name("ECA").unwrap(), &self.eca).unwrap()
    }

    /// `RequestAttributes` for the default caller, signed by the TCA
    pub fn request(&self, attributes: &[&str]) -> RequestAttributesRequest {
        let mut req = self.unsigned_request(attributes);
        self.tca.sign_payload(&mut req).unwrap();
        req
    }

    pub fn unsigned_request(&self, attributes: &[&str]) -> RequestAttributesRequest {
        RequestAttributesRequest::new(
            "u1",
            self.enrollment_cert(ENROLLMENT_ID),
            attributes.iter().map(|a| a.to_string()).collect(),
        )
    }

    /// `FetchAttributes` for the default caller, signed by the ECA
    pub fn fetch(&self) -> FetchAttributesRequest {
        let mut req = FetchAttributesRequest::new(self.enrollment_cert(ENROLLMENT_ID));
        self.eca.sign_payload(&mut req).unwrap();
        req
    }
}

/// keyUsage extension with only digitalSignature set
pub fn digital_signature() -> Extension {
    Extension {
        extn_id: KEY_USAGE,
        critical: true,
        extn_value: OctetString::new(vec![0x03, 0x02, 0x07, 0x80]).unwrap(),
    }
}
