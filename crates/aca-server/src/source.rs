//! Attribute sources
//!
//! An [`AttributeSource`] is the external feed of raw attribute tuples. It
//! returns every tuple it knows about; filtering by owner is the caller's job.
//!
//! The provided adapters read the `aca.attributes` TOML table, whose values
//! are semicolon-separated tuples:
//!
//! ```toml
//! [aca.attributes]
//! attribute-entry-0 = "u1;org1;title;engineer;2020-01-01T00:00:00Z;"
//! attribute-entry-1 = "u1;org1;clearance;secret;;2030-01-01T00:00:00Z"
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered fields of one raw attribute tuple
pub type RawAttribute = Vec<String>;

/// Error type for attribute sources
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The feed could not be reached or read
    #[error("Attribute source unavailable: {0}")]
    Unavailable(String),

    /// The feed was read but is not a valid attribute table
    #[error("Malformed attribute feed: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// External feed of raw attribute tuples
#[async_trait]
pub trait AttributeSource: Send + Sync + Debug {
    /// Every tuple in the feed, unfiltered
    async fn fetch_all(&self) -> Result<Vec<RawAttribute>, SourceError>;
}

#[derive(Debug, Default, Deserialize)]
struct AttributeFeed {
    #[serde(default)]
    aca: AcaSection,
}

#[derive(Debug, Default, Deserialize)]
struct AcaSection {
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

/// Split a `;`-separated entry into raw fields
pub fn split_entry(entry: &str) -> RawAttribute {
    entry.split(';').map(str::to_string).collect()
}

fn parse_feed(text: &str) -> Result<Vec<RawAttribute>, SourceError> {
    let feed: AttributeFeed = toml::from_str(text).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(feed.aca.attributes.values().map(|entry| split_entry(entry)).collect())
}

/// Fixed set of tuples held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticAttributeSource {
    entries: Vec<RawAttribute>,
}

impl StaticAttributeSource {
    pub fn new(entries: Vec<RawAttribute>) -> Self {
        Self { entries }
    }

    /// Source with no attributes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `;`-separated entries
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        Self::new(entries.iter().map(|e| split_entry(e.as_ref())).collect())
    }

    /// Parse an `aca.attributes` TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, SourceError> {
        Ok(Self::new(parse_feed(text)?))
    }
}

#[async_trait]
impl AttributeSource for StaticAttributeSource {
    async fn fetch_all(&self) -> Result<Vec<RawAttribute>, SourceError> {
        Ok(self.entries.clone())
    }
}

/// TOML feed re-read from disk on every fetch
#[derive(Debug, Clone)]
pub struct FileAttributeSource {
    path: PathBuf,
}

impl FileAttributeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AttributeSource for FileAttributeSource {
    async fn fetch_all(&self) -> Result<Vec<RawAttribute>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let entries = parse_feed(&text)?;
        debug!(path = %self.path.display(), entries = entries.len(), "Read attribute feed");
        Ok(entries)
    }
}
