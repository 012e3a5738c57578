//! Attribute certificate extensions
//!
//! Each matched attribute is embedded in the issued certificate as a
//! non-critical X.509 extension. Attribute extensions live under the arc
//! `1.2.3.4.5.6`; the last arc of the root, `10`, is reserved, and the k-th
//! attribute (0-based) is tagged `1.2.3.4.5.6.(11 + k)` so attribute
//! extensions never collide with standard ones.
//!
//! The extension value is the DER encoding of
//!
//! ```text
//! AttributeExtension ::= SEQUENCE {
//!     name       UTF8String,
//!     value      OCTET STRING,
//!     validFrom  [0] INTEGER OPTIONAL,
//!     validTo    [1] INTEGER OPTIONAL }
//! ```
//!
//! Bounds are signed Unix seconds, so dates before 1970 encode as negative
//! integers.

use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::{Decode, Encode, Sequence};
use x509_cert::ext::Extension;

use crate::attribute::AttributeRecord;
use crate::error::{AcaError, Result};

/// Root of the attribute extension namespace
pub const ATTRIBUTE_EXTENSION_ROOT: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.3.4.5.6.10");

/// Last arc given to the first attribute extension
pub const FIRST_ATTRIBUTE_ARC: u32 = 11;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct AttributeExtension {
    name: String,
    value: OctetString,
    #[asn1(context_specific = "0", optional = "true")]
    valid_from: Option<i64>,
    #[asn1(context_specific = "1", optional = "true")]
    valid_to: Option<i64>,
}

/// Attribute recovered from a certificate extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeClaim {
    pub oid: ObjectIdentifier,
    pub name: String,
    pub value: Vec<u8>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

/// Object identifier of the attribute at `position` in an issued certificate
pub fn attribute_oid(position: usize) -> Result<ObjectIdentifier> {
    let arc = u32::try_from(position)
        .ok()
        .and_then(|p| p.checked_add(FIRST_ATTRIBUTE_ARC))
        .ok_or_else(|| AcaError::Der(format!("attribute position {} out of range", position)))?;
    ObjectIdentifier::new(&format!("1.2.3.4.5.6.{}", arc)).map_err(|e| AcaError::Der(e.to_string()))
}

/// Whether `oid` tags an attribute extension
///
/// True when the OID has the same length and prefix as the namespace root
/// and its last arc is greater than the root's.
pub fn is_attribute_oid(oid: &ObjectIdentifier) -> bool {
    let root: Vec<u32> = ATTRIBUTE_EXTENSION_ROOT.arcs().collect();
    let arcs: Vec<u32> = oid.arcs().collect();
    if arcs.len() != root.len() {
        return false;
    }
    let last = root.len() - 1;
    arcs[..last] == root[..last] && root[last] < arcs[last]
}

/// DER-encode the `(name, value, validFrom, validTo)` of a record
pub fn encode_attribute(record: &AttributeRecord) -> Result<Vec<u8>> {
    let ext = AttributeExtension {
        name: record.name().to_string(),
        value: OctetString::new(record.value().to_vec())?,
        valid_from: record.valid_from().map(|at| at.timestamp()),
        valid_to: record.valid_to().map(|at| at.timestamp()),
    };
    Ok(ext.to_der()?)
}

/// Build one extension per record, numbered in order
pub fn attribute_extensions(records: &[AttributeRecord]) -> Result<Vec<Extension>> {
    records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            Ok(Extension {
                extn_id: attribute_oid(position)?,
                critical: false,
                extn_value: OctetString::new(encode_attribute(record)?)?,
            })
        })
        .collect()
}

/// Decode an attribute extension; `None` if the OID is not an attribute OID
pub fn decode_attribute_extension(ext: &Extension) -> Result<Option<AttributeClaim>> {
    if !is_attribute_oid(&ext.extn_id) {
        return Ok(None);
    }
    let decoded = AttributeExtension::from_der(ext.extn_value.as_bytes())?;
    Ok(Some(AttributeClaim {
        oid: ext.extn_id,
        name: decoded.name,
        value: decoded.value.into_bytes(),
        valid_from: decoded.valid_from.map(from_unix_seconds).transpose()?,
        valid_to: decoded.valid_to.map(from_unix_seconds).transpose()?,
    }))
}

fn from_unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| AcaError::Der(format!("timestamp {} out of range", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeOwner;
    use chrono::TimeZone;

    fn record(name: &str, value: &str) -> AttributeRecord {
        AttributeRecord::new(
            AttributeOwner::new("u1", "org1"),
            name,
            value.as_bytes().to_vec(),
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_attribute_oid_numbering() {
        assert_eq!(attribute_oid(0).unwrap().to_string(), "1.2.3.4.5.6.11");
        assert_eq!(attribute_oid(4).unwrap().to_string(), "1.2.3.4.5.6.15");
    }

    #[test]
    fn test_is_attribute_oid() {
        assert!(is_attribute_oid(&attribute_oid(0).unwrap()));
        assert!(!is_attribute_oid(&ATTRIBUTE_EXTENSION_ROOT));
        assert!(!is_attribute_oid(&ObjectIdentifier::new_unwrap("1.2.3.4.5.6.9")));
        assert!(!is_attribute_oid(&ObjectIdentifier::new_unwrap("1.2.3.4.5.7.11")));
        assert!(!is_attribute_oid(&ObjectIdentifier::new_unwrap("1.2.3.4.5.6.11.1")));
        // keyUsage
        assert!(!is_attribute_oid(&ObjectIdentifier::new_unwrap("2.5.29.15")));
    }

    #[test]
    fn test_extension_decodes_to_record_fields() {
        let exts = attribute_extensions(&[record("title", "engineer")]).unwrap();
        assert_eq!(exts.len(), 1);
        assert!(!exts[0].critical);

        let claim = decode_attribute_extension(&exts[0]).unwrap().unwrap();
        assert_eq!(claim.name, "title");
        assert_eq!(claim.value, b"engineer");
        assert_eq!(claim.valid_from, Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(claim.valid_to, None);
    }

    #[test]
    fn test_extensions_are_numbered_in_order() {
        let exts = attribute_extensions(&[record("a", "1"), record("b", "2")]).unwrap();
        let oids: Vec<String> = exts.iter().map(|e| e.extn_id.to_string()).collect();
        assert_eq!(oids, vec!["1.2.3.4.5.6.11", "1.2.3.4.5.6.12"]);
    }

    #[test]
    fn test_no_records_no_extensions() {
        assert!(attribute_extensions(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_pre_epoch_bounds_survive_encoding() {
        let from = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        let old = AttributeRecord::new(AttributeOwner::new("u1", "org1"), "title", b"x".to_vec(), Some(from), Some(to))
            .unwrap();

        let exts = attribute_extensions(&[old]).unwrap();
        let claim = decode_attribute_extension(&exts[0]).unwrap().unwrap();
        assert_eq!(claim.valid_from, Some(from));
        assert_eq!(claim.valid_to, Some(to));
    }
}
