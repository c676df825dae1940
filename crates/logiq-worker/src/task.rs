//! The ingestion task: normalize, embed, persist

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use logiq_core::timestamp::resolve_log_timestamp;
use logiq_core::{normalize_level, IngestPayload, LogRecord, StoredLog};
use logiq_rag::{EmbeddingError, EmbeddingProvider, LogStore, StoreError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::bootstrap::SchemaGuard;
use crate::retry::{run_with_retry, Retriable, RetryPolicy, TaskFailure};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("schema bootstrap failed: {0}")]
    Bootstrap(StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retriable for IngestError {
    fn is_retriable(&self) -> bool {
        match self {
            IngestError::Bootstrap(e) | IngestError::Store(e) => e.is_transient(),
            IngestError::Embedding(e) => !e.is_permanent(),
        }
    }
}

/// A stored log and how many attempts it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub log_id: Uuid,
    pub attempts: u32,
}

/// Normalizes a payload into the record that will be stored.
pub fn build_record(payload: &IngestPayload, now: DateTime<Utc>) -> LogRecord {
    LogRecord {
        id: Uuid::new_v4(),
        created_at: now,
        log_timestamp: resolve_log_timestamp(payload.log_timestamp.as_ref(), now),
        service: payload.service.clone(),
        level: normalize_level(&payload.level),
        message: payload.message.clone(),
        attributes: payload.merged_attributes(),
    }
}

#[derive(Clone)]
pub struct IngestTask {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn LogStore>,
    guard: Arc<SchemaGuard>,
}

impl IngestTask {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn LogStore>, guard: Arc<SchemaGuard>) -> Self {
        Self { embedder, store, guard }
    }

    /// One attempt, from scratch.
    pub async fn run_once(&self, payload: &IngestPayload) -> Result<Uuid, IngestError> {
        self.guard
            .ensure_ready(self.store.as_ref())
            .await
            .map_err(IngestError::Bootstrap)?;

        let embedding = self.embedder.embed(&payload.message).await?;
        let record = build_record(payload, Utc::now());
        let (service, level) = (record.service.clone(), record.level.clone());

        let id = self.store.insert(StoredLog::new(record, embedding)).await?;
        info!(%id, %service, %level, "Log stored");
        Ok(id)
    }

    /// Runs the task under `policy` until it is stored or fails for good.
    ///
    /// `attempts` is updated as each attempt starts, so a caller that gives up
    /// early still knows how far the task got.
    pub async fn process(
        &self,
        payload: &IngestPayload,
        policy: RetryPolicy,
        attempts: &AtomicU32,
    ) -> Result<IngestOutcome, TaskFailure<IngestError>> {
        let (log_id, taken) = run_with_retry(policy, move |attempt| {
            attempts.store(attempt, Ordering::Relaxed);
            self.run_once(payload)
        })
        .await?;
        Ok(IngestOutcome { log_id, attempts: taken })
    }
}
