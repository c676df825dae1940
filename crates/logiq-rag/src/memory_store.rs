// In-process store
// Exact scan over every stored vector. Used by tests, benches and local runs
// without a Qdrant server.

use async_trait::async_trait;
use logiq_core::{cosine_distance, Embedding, QueryFilters, RetrievedCandidate, StoredLog};
use std::sync::RwLock;
use uuid::Uuid;

use crate::store::{validate_columns, LogStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryLogStore {
    logs: RwLock<Vec<StoredLog>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.logs.read().map(|logs| logs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, log: StoredLog) -> Result<Uuid, StoreError> {
        validate_columns(&log.record)?;
        let id = log.record.id;
        let mut logs = self
            .logs
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        logs.push(log);
        Ok(id)
    }

    async fn search(
        &self,
        query: &Embedding,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>, StoreError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;

        let mut candidates: Vec<RetrievedCandidate> = logs
            .iter()
            .filter(|log| filters.matches(&log.record))
            .map(|log| RetrievedCandidate {
                record: log.record.clone(),
                distance: cosine_distance(query, &log.embedding),
            })
            .collect();

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(limit);
        Ok(candidates)
    }
}
