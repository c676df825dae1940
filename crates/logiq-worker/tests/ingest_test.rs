use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use logiq_core::task::{TaskEnvelope, TaskStatus};
use logiq_core::{Embedding, IngestPayload, QueryFilters, RESERVED_KEYS, RetrievedCandidate, StoredLog};
use logiq_rag::{EmbeddingError, EmbeddingProvider, HashingEmbedder, LogStore, MemoryLogStore, StoreError};
use logiq_worker::{IngestError, IngestTask, RetryPolicy, SchemaGuard, Worker};
use serde_json::json;
use uuid::Uuid;

/// Memory store whose first `failures` inserts fail with `error`.
struct FlakyStore {
    inner: MemoryLogStore,
    failures: AtomicUsize,
    error: StoreError,
    schema_calls: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize, error: StoreError) -> Self {
        Self {
            inner: MemoryLogStore::new(),
            failures: AtomicUsize::new(failures),
            error,
            schema_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LogStore for FlakyStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, log: StoredLog) -> Result<Uuid, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        self.inner.insert(log).await
    }

    async fn search(
        &self,
        query: &Embedding,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>, StoreError> {
        self.inner.search(query, filters, limit).await
    }
}

struct BrokenEmbedder {
    calls: AtomicU32,
}

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::Unavailable("model files missing".to_string()))
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

struct SlowEmbedder;

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(EmbeddingError::Failed("too slow".to_string()))
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

fn example_payload() -> IngestPayload {
    serde_json::from_value(json!({
        "service": "auth-api",
        "level": "error",
        "message": "User 501 failed login",
        "attributes": {"user_id": 501}
    }))
    .unwrap()
}

fn task_with(store: Arc<dyn LogStore>) -> IngestTask {
    IngestTask::new(Arc::new(HashingEmbedder::new()), store, Arc::new(SchemaGuard::new()))
}

#[tokio::test]
async fn test_example_payload_is_stored_normalized() {
    let store = Arc::new(MemoryLogStore::new());
    let task = task_with(store.clone());

    let before = Utc::now().trunc_subsecs(6);
    let id = task.run_once(&example_payload()).await.unwrap();

    let query = HashingEmbedder::new().embed_sync("User 501 failed login").unwrap();
    let found = store.search(&query, &QueryFilters::default(), 1).await.unwrap();
    let record = &found[0].record;

    assert_eq!(record.id, id);
    assert_eq!(record.level, "ERROR");
    assert_eq!(record.service, "auth-api");
    assert!(record.log_timestamp >= before && record.log_timestamp <= Utc::now());
    assert_eq!(serde_json::Value::Object(record.attributes.clone()), json!({"user_id": 501}));
}

#[tokio::test]
async fn test_leaked_reserved_keys_never_stored() {
    let store = Arc::new(MemoryLogStore::new());
    let task = task_with(store.clone());
    let payload: IngestPayload = serde_json::from_value(json!({
        "service": "billing",
        "level": "warn",
        "message": "Retrying charge",
        "attributes": {"message": "shadow", "attributes": {}, "attempt": 2},
        "region": "eu-west-1"
    }))
    .unwrap();

    task.run_once(&payload).await.unwrap();

    let query = HashingEmbedder::new().embed_sync("Retrying charge").unwrap();
    let record = store.search(&query, &QueryFilters::default(), 1).await.unwrap().remove(0).record;
    for key in RESERVED_KEYS {
        assert!(!record.attributes.contains_key(key), "reserved key {key} leaked");
    }
    assert_eq!(record.attributes.get("region"), Some(&json!("eu-west-1")));
    assert_eq!(record.attributes.get("attempt"), Some(&json!(2)));
}

#[tokio::test]
async fn test_unparseable_timestamp_does_not_fail_the_task() {
    let store = Arc::new(MemoryLogStore::new());
    let task = task_with(store.clone());
    let mut payload = example_payload();
    payload.log_timestamp = Some("31/02/2024 25:61".into());

    let before = Utc::now().trunc_subsecs(6);
    task.run_once(&payload).await.unwrap();

    let query = HashingEmbedder::new().embed_sync("User 501 failed login").unwrap();
    let record = store.search(&query, &QueryFilters::default(), 1).await.unwrap().remove(0).record;
    assert!(record.log_timestamp >= before);
    assert!(record.log_timestamp - before < chrono::Duration::seconds(5));
}

#[tokio::test]
async fn test_transient_store_errors_are_retried() {
    let store = Arc::new(FlakyStore::new(2, StoreError::Unavailable("connection reset".to_string())));
    let task = task_with(store.clone());
    let attempts = AtomicU32::new(0);

    let outcome = task
        .process(&example_payload(), RetryPolicy::immediate(5), &attempts)
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(store.inner.len(), 1);
    // bootstrap happens once per process, not once per attempt
    assert_eq!(store.schema_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let store = Arc::new(FlakyStore::new(100, StoreError::Unavailable("down".to_string())));
    let task = task_with(store.clone());
    let attempts = AtomicU32::new(0);

    let failure = task
        .process(&example_payload(), RetryPolicy::immediate(5), &attempts)
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 6);
    assert_eq!(attempts.load(Ordering::SeqCst), 6);
    assert!(matches!(failure.error, IngestError::Store(StoreError::Unavailable(_))));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_rejected_record_fails_without_retry() {
    let store = Arc::new(MemoryLogStore::new());
    let task = task_with(store.clone());
    let payload = IngestPayload::new("s".repeat(300), "error", "too long a service name");
    let attempts = AtomicU32::new(0);

    let failure = task
        .process(&payload, RetryPolicy::immediate(5), &attempts)
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 1);
    assert!(matches!(failure.error, IngestError::Store(StoreError::Rejected(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unavailable_embedder_fails_without_retry() {
    let embedder = Arc::new(BrokenEmbedder { calls: AtomicU32::new(0) });
    let store = Arc::new(MemoryLogStore::new());
    let task = IngestTask::new(embedder.clone(), store.clone(), Arc::new(SchemaGuard::new()));
    let attempts = AtomicU32::new(0);

    let failure = task
        .process(&example_payload(), RetryPolicy::immediate(5), &attempts)
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_worker_reports_success() {
    let store = Arc::new(MemoryLogStore::new());
    let worker = Worker::new(task_with(store.clone()), RetryPolicy::immediate(5), Duration::from_secs(30));
    let envelope = TaskEnvelope::new(example_payload());

    let report = worker.handle(&envelope).await;

    assert_eq!(report.task_id, envelope.task_id);
    match report.status {
        TaskStatus::Succeeded { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_worker_reports_exhausted_retries_as_failed() {
    let store = Arc::new(FlakyStore::new(100, StoreError::Unavailable("down".to_string())));
    let worker = Worker::new(task_with(store), RetryPolicy::immediate(2), Duration::from_secs(30));

    let report = worker.handle(&TaskEnvelope::new(example_payload())).await;

    match report.status {
        TaskStatus::Failed { attempts, error } => {
            assert_eq!(attempts, 3);
            assert!(error.contains("down"));
        }
        other => panic!("unexpected status {other:?}"),
    }
}

#[tokio::test]
async fn test_worker_enforces_time_limit() {
    let task = IngestTask::new(
        Arc::new(SlowEmbedder),
        Arc::new(MemoryLogStore::new()),
        Arc::new(SchemaGuard::new()),
    );
    let worker = Worker::new(task, RetryPolicy::immediate(5), Duration::from_millis(50));

    let report = worker.handle(&TaskEnvelope::new(example_payload())).await;

    match report.status {
        TaskStatus::Failed { attempts, error } => {
            assert_eq!(attempts, 1);
            assert!(error.contains("time limit"));
        }
        other => panic!("unexpected status {other:?}"),
    }
}
