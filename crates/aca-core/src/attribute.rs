//! Attribute data model
//!
//! An [`AttributeRecord`] binds a named, binary value to an
//! [`AttributeOwner`] for a half-open validity window `[valid_from, valid_to)`.
//! Unset bounds extend the window to the beginning or end of time.
//!
//! Records are keyed for storage by `(id, affiliation, name)`; see
//! [`AttributeRecord::key`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AcaError, Result};

/// Number of ordered fields a raw attribute tuple must carry
pub const ATTRIBUTE_TUPLE_FIELDS: usize = 6;

/// Identity that owns an attribute
///
/// Equality is exact and case-sensitive on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeOwner {
    id: String,
    affiliation: String,
}

impl AttributeOwner {
    pub fn new(id: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            affiliation: affiliation.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn affiliation(&self) -> &str {
        &self.affiliation
    }
}

/// Storage key of an attribute: `(id, affiliation, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey {
    pub owner: AttributeOwner,
    pub name: String,
}

impl AttributeKey {
    pub fn new(owner: AttributeOwner, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

/// A named, timestamped, valued fact about an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    owner: AttributeOwner,
    name: String,
    value: Vec<u8>,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
}

impl AttributeRecord {
    /// Create a record, rejecting an empty attribute name
    pub fn new(
        owner: AttributeOwner,
        name: impl Into<String>,
        value: impl Into<Vec<u8>>,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(AcaError::InvalidAttribute(
                "attribute name cannot be empty".into(),
            ));
        }
        Ok(Self {
            owner,
            name,
            value: value.into(),
            valid_from,
            valid_to,
        })
    }

    /// Parse a raw tuple `id, affiliation, name, value, validFrom, validTo`.
    ///
    /// Fields are trimmed. Empty date fields leave the bound unset; any other
    /// date must be RFC 3339. Extra trailing fields are ignored.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        if fields.len() < ATTRIBUTE_TUPLE_FIELDS {
            return Err(AcaError::InvalidAttribute(format!(
                "expected {} fields, got {}",
                ATTRIBUTE_TUPLE_FIELDS,
                fields.len()
            )));
        }

        let field = |i: usize| fields[i].as_ref().trim();

        let owner = AttributeOwner::new(field(0), field(1));
        let valid_from = parse_bound(field(4))?;
        let valid_to = parse_bound(field(5))?;

        Self::new(owner, field(2), field(3).as_bytes().to_vec(), valid_from, valid_to)
    }

    pub fn owner(&self) -> &AttributeOwner {
        &self.owner
    }

    pub fn id(&self) -> &str {
        self.owner.id()
    }

    pub fn affiliation(&self) -> &str {
        self.owner.affiliation()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.valid_from
    }

    pub fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.valid_to
    }

    /// Storage key of this record
    pub fn key(&self) -> AttributeKey {
        AttributeKey::new(self.owner.clone(), self.name.clone())
    }

    /// Whether the record belongs to `(id, affiliation)`
    pub fn is_owned_by(&self, id: &str, affiliation: &str) -> bool {
        self.owner.id == id && self.owner.affiliation == affiliation
    }

    /// Whether `at` falls inside `[valid_from, valid_to)`
    pub fn valid_for(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= at) && self.valid_to.map_or(true, |to| at < to)
    }

    /// Whether this record should overwrite a stored row whose `valid_from`
    /// is `stored`. Only a strictly newer start replaces; an unset start
    /// orders before every set one.
    pub fn supersedes(&self, stored: Option<DateTime<Utc>>) -> bool {
        stored < self.valid_from
    }
}

fn parse_bound(raw: &str) -> Result<Option<DateTime<Utc>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| AcaError::InvalidDate {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_from_fields_full_tuple() {
        let fields = [
            "alice",
            " org1 ",
            "position",
            "Software Engineer",
            "2015-01-01T00:00:00-03:00",
            "2015-07-12T00:00:00-03:00",
        ];
        let record = AttributeRecord::from_fields(&fields).unwrap();

        assert_eq!(record.id(), "alice");
        assert_eq!(record.affiliation(), "org1");
        assert_eq!(record.name(), "position");
        assert_eq!(record.value(), b"Software Engineer");
        assert_eq!(record.valid_from(), Some(Utc.with_ymd_and_hms(2015, 1, 1, 3, 0, 0).unwrap()));
        assert!(record.valid_to().is_some());
    }

    #[test]
    fn test_from_fields_empty_dates_are_unbounded() {
        let record =
            AttributeRecord::from_fields(&["bob", "org2", "clearance", "secret", "", ""]).unwrap();

        assert!(record.valid_from().is_none());
        assert!(record.valid_to().is_none());
        assert!(record.valid_for(ts(1970, 1, 1)));
        assert!(record.valid_for(ts(2999, 1, 1)));
    }

    #[test]
    fn test_from_fields_too_few_fields() {
        let result = AttributeRecord::from_fields(&["bob", "org2", "clearance", "secret", ""]);
        assert!(matches!(result, Err(AcaError::InvalidAttribute(_))));
    }

    #[test]
    fn test_from_fields_bad_date() {
        let result =
            AttributeRecord::from_fields(&["bob", "org2", "clearance", "secret", "yesterday", ""]);
        assert!(matches!(result, Err(AcaError::InvalidDate { .. })));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = AttributeRecord::from_fields(&["bob", "org2", "  ", "secret", "", ""]);
        assert!(matches!(result, Err(AcaError::InvalidAttribute(_))));
    }

    #[test]
    fn test_valid_for_boundaries() {
        let record = AttributeRecord::new(
            AttributeOwner::new("u1", "org1"),
            "title",
            b"engineer".to_vec(),
            Some(ts(2020, 1, 1)),
            Some(ts(2021, 1, 1)),
        )
        .unwrap();

        assert!(!record.valid_for(ts(2019, 12, 31)));
        assert!(record.valid_for(ts(2020, 1, 1)));
        assert!(record.valid_for(ts(2020, 6, 1)));
        assert!(!record.valid_for(ts(2021, 1, 1)));
    }

    #[test]
    fn test_supersedes_requires_strictly_newer_start() {
        let owner = AttributeOwner::new("u1", "org1");
        let newer = AttributeRecord::new(owner.clone(), "a", b"x".to_vec(), Some(ts(2021, 1, 1)), None).unwrap();
        let unset = AttributeRecord::new(owner, "a", b"x".to_vec(), None, None).unwrap();

        assert!(newer.supersedes(None));
        assert!(newer.supersedes(Some(ts(2020, 1, 1))));
        assert!(!newer.supersedes(Some(ts(2021, 1, 1))));
        assert!(!unset.supersedes(None));
        assert!(!unset.supersedes(Some(ts(2020, 1, 1))));
    }

    #[test]
    fn test_owner_equality_is_case_sensitive() {
        assert_ne!(AttributeOwner::new("Alice", "org1"), AttributeOwner::new("alice", "org1"));
        assert_eq!(AttributeOwner::new("alice", "org1"), AttributeOwner::new("alice", "org1"));
    }
}
