// Persistence contract for logs and their embeddings
//
// Stores insert one record at a time (all or nothing) and answer filtered
// nearest-neighbour queries ordered by ascending cosine distance.

use async_trait::async_trait;
use logiq_core::{Embedding, LogRecord, QueryFilters, RetrievedCandidate, StoredLog, MAX_LEVEL_LEN, MAX_SERVICE_LEN};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Backend unreachable or busy; worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The record violates a storage constraint; retrying cannot help.
    #[error("record rejected: {0}")]
    Rejected(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Create whatever structures the store needs. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Persist one log atomically and return its id.
    async fn insert(&self, log: StoredLog) -> Result<Uuid, StoreError>;

    /// Up to `limit` records matching `filters`, closest first.
    async fn search(
        &self,
        query: &Embedding,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>, StoreError>;
}

/// Column constraints shared by every backend.
pub fn validate_columns(record: &LogRecord) -> Result<(), StoreError> {
    if record.service.trim().is_empty() {
        return Err(StoreError::Rejected("service must not be empty".to_string()));
    }
    if record.service.chars().count() > MAX_SERVICE_LEN {
        return Err(StoreError::Rejected(format!(
            "service exceeds {MAX_SERVICE_LEN} characters"
        )));
    }
    if record.level.chars().count() > MAX_LEVEL_LEN {
        return Err(StoreError::Rejected(format!("level exceeds {MAX_LEVEL_LEN} characters")));
    }
    Ok(())
}
