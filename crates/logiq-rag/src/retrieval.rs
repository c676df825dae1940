// Retrieval engine
// Filtered nearest-neighbour search over stored logs, best match first.

use logiq_core::{Embedding, QueryFilters, RetrievedCandidate};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::store::{LogStore, StoreError};

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("limit must be a positive integer, got {0}")]
    InvalidLimit(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RetrievalEngine {
    store: Arc<dyn LogStore>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// At most `limit` candidates satisfying every filter, ascending by distance.
    pub async fn search(
        &self,
        query: &Embedding,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>, RetrievalError> {
        if limit == 0 {
            return Err(RetrievalError::InvalidLimit(limit));
        }

        let mut candidates = self.store.search(query, filters, limit).await?;

        // stores are trusted for filtering, not for order or length
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(limit);

        debug!(limit, found = candidates.len(), filtered = !filters.is_empty(), "Retrieval complete");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::memory_store::MemoryLogStore;
    use chrono::Utc;
    use logiq_core::{LogRecord, StoredLog};
    use serde_json::Map;
    use uuid::Uuid;

    async fn seeded(messages: &[(&str, &str, &str)]) -> RetrievalEngine {
        let embedder = HashingEmbedder::new();
        let store = Arc::new(MemoryLogStore::new());
        for (service, level, message) in messages {
            let record = LogRecord {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                log_timestamp: Utc::now(),
                service: service.to_string(),
                level: level.to_string(),
                message: message.to_string(),
                attributes: Map::new(),
            };
            let embedding = embedder.embed_sync(message).unwrap();
            store.insert(StoredLog::new(record, embedding)).await.unwrap();
        }
        RetrievalEngine::new(store)
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected() {
        let engine = seeded(&[("a", "INFO", "hello")]).await;
        let query = HashingEmbedder::new().embed_sync("hello").unwrap();

        let err = engine.search(&query, &QueryFilters::default(), 0).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidLimit(0)));
    }

    #[tokio::test]
    async fn test_returns_all_when_fewer_than_limit() {
        let engine = seeded(&[("a", "INFO", "one"), ("b", "WARN", "two")]).await;
        let query = HashingEmbedder::new().embed_sync("one").unwrap();

        let results = engine.search(&query, &QueryFilters::default(), 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.message, "one");
    }

    #[tokio::test]
    async fn test_filters_restrict_but_keep_order() {
        let engine = seeded(&[
            ("auth-api", "ERROR", "login failed for user 501"),
            ("auth-api", "INFO", "login succeeded for user 501"),
            ("billing", "ERROR", "login token expired"),
            ("auth-api", "ERROR", "password reset requested"),
        ])
        .await;
        let query = HashingEmbedder::new().embed_sync("login failed").unwrap();

        let unfiltered = engine.search(&query, &QueryFilters::default(), 10).await.unwrap();
        let filters = QueryFilters {
            service: Some("auth-api".to_string()),
            level: Some("error".to_string()),
            ..Default::default()
        };
        let filtered = engine.search(&query, &filters, 10).await.unwrap();

        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|c| c.record.service == "auth-api" && c.record.level == "ERROR"));

        let expected: Vec<_> = unfiltered
            .iter()
            .filter(|c| filters.matches(&c.record))
            .map(|c| c.record.id)
            .collect();
        let actual: Vec<_> = filtered.iter().map(|c| c.record.id).collect();
        assert_eq!(actual, expected);
    }
}
