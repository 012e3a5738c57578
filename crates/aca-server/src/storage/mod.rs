//! Storage abstraction for attribute records
//!
//! Attributes are keyed by `(id, affiliation, name)` with at most one stored
//! row per key. Writes go through a transactional batch upsert: each record is
//! inserted if absent, or replaces the stored row only when its `valid_from`
//! is strictly later. A stale write is a no-op, not an error. Any failure in a
//! batch rolls back the whole batch.
//!
//! Two backends are provided: in-memory (default) and PostgreSQL (behind the
//! `postgres` feature).

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryStore, MemoryTransaction};
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use aca_core::{AttributeOwner, AttributeRecord};
use async_trait::async_trait;
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid attribute record: {0}")]
    InvalidRecord(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether the store itself is unusable, as opposed to one batch failing
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, StorageError::Connection(_) | StorageError::LockPoisoned)
    }
}

/// Effect of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Stored row has an equal or later `valid_from`; nothing written
    Stale,
}

/// Counts of upsert outcomes over a committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub stale: usize,
}

impl UpsertSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Stale => self.stale += 1,
        }
    }
}

/// Storage backend trait for attribute records
///
/// Implementations must be thread-safe. All mutation is serialized through a
/// single store-wide lock held for the duration of a batch; reads do not take
/// it.
#[async_trait]
pub trait AttributeStore: Send + Sync + Debug {
    /// Upsert every record in one transaction, all-or-nothing
    async fn upsert_all(&self, records: &[AttributeRecord]) -> Result<UpsertSummary, StorageError>;

    /// Point lookup by exact key; no validity-window filtering
    async fn find(&self, owner: &AttributeOwner, name: &str) -> Result<Option<AttributeRecord>, StorageError>;
}
