//! Attribute refresh pipeline
//!
//! Pulls the full feed from an [`AttributeSource`], parses every tuple, keeps
//! those owned by the requested identity and writes them through the
//! [`AttributeStore`] in one batch. One bad tuple anywhere in the feed aborts
//! the refresh: a caller never proceeds on a partial attribute view.

use aca_core::{AcaError, AttributeRecord};
use std::sync::Arc;
use tracing::{info, warn};

use crate::source::{AttributeSource, SourceError};
use crate::storage::{AttributeStore, StorageError, UpsertSummary};

/// Error type for refresh operations
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Invalid attribute entry '{entry}': {source}")]
    Parse {
        entry: String,
        #[source]
        source: AcaError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RefreshError {
    /// Whether the failure is an outage rather than bad data
    pub fn is_infrastructure(&self) -> bool {
        match self {
            RefreshError::Source(err) => err.is_infrastructure(),
            RefreshError::Parse { .. } => false,
            RefreshError::Storage(err) => err.is_infrastructure(),
        }
    }
}

/// Keeps stored attributes in sync with the source
#[derive(Debug, Clone)]
pub struct RefreshPipeline {
    source: Arc<dyn AttributeSource>,
    store: Arc<dyn AttributeStore>,
}

impl RefreshPipeline {
    pub fn new(source: Arc<dyn AttributeSource>, store: Arc<dyn AttributeStore>) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &Arc<dyn AttributeStore> {
        &self.store
    }

    /// Every record in the source owned by `(id, affiliation)`
    pub async fn fetch(&self, id: &str, affiliation: &str) -> Result<Vec<AttributeRecord>, RefreshError> {
        let raw = self.source.fetch_all().await?;

        let mut records = Vec::new();
        for fields in &raw {
            let record = AttributeRecord::from_fields(fields).map_err(|source| {
                let entry = fields.join(";");
                warn!(entry = %entry, error = %source, "Invalid attribute entry in source");
                RefreshError::Parse { entry, source }
            })?;
            if record.is_owned_by(id, affiliation) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Fetch the identity's attributes and upsert them as one batch
    pub async fn refresh(&self, id: &str, affiliation: &str) -> Result<UpsertSummary, RefreshError> {
        let records = self.fetch(id, affiliation).await?;
        let summary = self.store.upsert_all(&records).await?;

        info!(
            id = %id,
            affiliation = %affiliation,
            fetched = records.len(),
            inserted = summary.inserted,
            updated = summary.updated,
            "Refreshed attributes"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticAttributeSource;
    use crate::storage::MemoryStore;
    use aca_core::AttributeOwner;

    fn pipeline(entries: &[&str]) -> (RefreshPipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(StaticAttributeSource::from_entries(entries));
        (RefreshPipeline::new(source, store.clone()), store)
    }

    #[tokio::test]
    async fn test_fetch_filters_by_owner() {
        let (pipeline, _) = pipeline(&[
            "u1;org1;title;engineer;2020-01-01T00:00:00Z;",
            "u1;org2;title;manager;;",
            "u2;org1;title;intern;;",
            " u1 ; org1 ;clearance;secret;;",
        ]);

        let records = pipeline.fetch("u1", "org1").await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["title", "clearance"]);
    }

    #[tokio::test]
    async fn test_bad_entry_for_other_owner_still_aborts() {
        let (pipeline, store) = pipeline(&["u1;org1;title;engineer;;", "u2;org2;title;x;not-a-date;"]);

        let err = pipeline.refresh("u1", "org1").await.unwrap_err();
        assert!(matches!(err, RefreshError::Parse { .. }));
        assert!(!err.is_infrastructure());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_short_entry_aborts() {
        let (pipeline, _) = pipeline(&["u1;org1;title;engineer"]);
        assert!(matches!(
            pipeline.fetch("u1", "org1").await,
            Err(RefreshError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_writes_through_store() {
        let (pipeline, store) = pipeline(&["u1;org1;title;engineer;2020-01-01T00:00:00Z;", "u2;org1;title;intern;;"]);

        let summary = pipeline.refresh("u1", "org1").await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(store.len().unwrap(), 1);

        let stored = store
            .find(&AttributeOwner::new("u1", "org1"), "title")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value(), b"engineer");

        // second refresh of an unchanged feed writes nothing new
        let summary = pipeline.refresh("u1", "org1").await.unwrap();
        assert_eq!(summary.stale, 1);
    }

    #[derive(Debug)]
    struct UnreachableStore;

    #[async_trait::async_trait]
    impl AttributeStore for UnreachableStore {
        async fn upsert_all(&self, _records: &[AttributeRecord]) -> Result<UpsertSummary, StorageError> {
            Err(StorageError::Connection("connection refused".into()))
        }

        async fn find(&self, _owner: &AttributeOwner, _name: &str) -> Result<Option<AttributeRecord>, StorageError> {
            Err(StorageError::Connection("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_refresh() {
        let source = Arc::new(StaticAttributeSource::from_entries(&["u1;org1;title;engineer;;"]));
        let pipeline = RefreshPipeline::new(source, Arc::new(UnreachableStore));

        let err = pipeline.refresh("u1", "org1").await.unwrap_err();
        assert!(matches!(err, RefreshError::Storage(StorageError::Connection(_))));
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_inverted_window_is_stored() {
        let (pipeline, store) = pipeline(&[
            "u1;org1;title;engineer;;",
            "u1;org1;clearance;secret;2022-01-01T00:00:00Z;2021-01-01T00:00:00Z",
        ]);

        let summary = pipeline.refresh("u1", "org1").await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(store.len().unwrap(), 2);
    }
}
