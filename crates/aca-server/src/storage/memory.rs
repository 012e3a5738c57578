//! In-memory storage backend
//!
//! Default storage implementation using an ordered map.
//! Suitable for development and single-instance deployments.
//! Data is lost on restart.

use aca_core::{AttributeKey, AttributeOwner, AttributeRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AttributeStore, StorageError, UpsertOutcome, UpsertSummary};

pub type Rows = BTreeMap<AttributeKey, AttributeRecord>;

/// In-memory attribute store
#[derive(Debug)]
pub struct MemoryStore {
    rows: RwLock<Rows>,
    /// Serializes writers for the duration of a batch
    write_lock: Mutex<()>,
}

/// Pending writes over a read view of the store
///
/// Only keys touched by the batch are staged. They become visible when
/// [`MemoryStore::upsert_all`] applies them; dropping the transaction
/// discards them.
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    base: &'a Rows,
    staged: Rows,
}

impl<'a> MemoryTransaction<'a> {
    pub fn new(base: &'a Rows) -> Self {
        Self {
            base,
            staged: Rows::new(),
        }
    }

    /// Insert the record if its key is absent, otherwise replace the current
    /// row only if the record's `valid_from` is strictly later
    pub fn upsert(&mut self, record: &AttributeRecord) -> Result<UpsertOutcome, StorageError> {
        let key = record.key();
        let current = self.staged.get(&key).or_else(|| self.base.get(&key));
        let outcome = match current {
            None => UpsertOutcome::Inserted,
            Some(stored) if record.supersedes(stored.valid_from()) => UpsertOutcome::Updated,
            Some(_) => return Ok(UpsertOutcome::Stale),
        };
        self.staged.insert(key, record.clone());
        Ok(outcome)
    }

    /// Staged rows, keyed like the store
    pub fn into_staged(self) -> Rows {
        self.staged
    }
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Number of stored rows
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.rows.read().map_err(|_| StorageError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Stage the batch against the current rows, then apply it. Callers hold
    /// the write lock, so the rows cannot change in between.
    fn apply(&self, records: &[AttributeRecord]) -> Result<UpsertSummary, StorageError> {
        let mut summary = UpsertSummary::default();
        let staged = {
            let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
            let mut tx = MemoryTransaction::new(&rows);
            for record in records {
                let outcome = tx.upsert(record)?;
                debug!(
                    id = %record.id(),
                    affiliation = %record.affiliation(),
                    attribute = %record.name(),
                    outcome = ?outcome,
                    "Staged attribute"
                );
                summary.record(outcome);
            }
            tx.into_staged()
        };

        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.extend(staged);
        Ok(summary)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttributeStore for MemoryStore {
    async fn upsert_all(&self, records: &[AttributeRecord]) -> Result<UpsertSummary, StorageError> {
        let _guard = self.write_lock.lock().await;
        let summary = self.apply(records)?;

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            stale = summary.stale,
            "Committed attribute batch"
        );
        Ok(summary)
    }

    async fn find(&self, owner: &AttributeOwner, name: &str) -> Result<Option<AttributeRecord>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.get(&AttributeKey::new(owner.clone(), name)).cloned())
    }
}
