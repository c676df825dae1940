use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use logiq_core::config::LlmSettings;
use logiq_core::{normalize_level, LogRecord, QueryFilters, RetrievedCandidate, StoredLog};
use logiq_rag::generation::UNCONFIGURED_REASON;
use logiq_rag::{
    Availability, EmbeddingProvider, GenerationProvider, GenerationUnavailable, HashingEmbedder, LocalLlm, LogStore,
    MemoryLogStore, OllamaLoader, RagConfig, RagEngine, RagError, RetrievalEngine, RetrievalError, NO_LOGS_ANSWER,
};
use serde_json::{json, Map};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct Fixture {
    store: Arc<MemoryLogStore>,
    embedder: Arc<HashingEmbedder>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryLogStore::new()),
            embedder: Arc::new(HashingEmbedder::new()),
        }
    }

    async fn add(&self, service: &str, level: &str, message: &str, minutes_ago: i64) -> Uuid {
        let record = LogRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            log_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() - Duration::minutes(minutes_ago),
            service: service.to_string(),
            level: normalize_level(level),
            message: message.to_string(),
            attributes: Map::new(),
        };
        let embedding = self.embedder.embed(message).await.unwrap();
        self.store.insert(StoredLog::new(record, embedding)).await.unwrap()
    }

    fn engine(&self, generator: Arc<dyn GenerationProvider>, max_context_logs: usize) -> RagEngine {
        RagEngine::new(
            RagConfig { max_context_logs },
            self.embedder.clone(),
            RetrievalEngine::new(self.store.clone()),
            generator,
        )
    }

    fn unconfigured_engine(&self) -> RagEngine {
        let llm = LocalLlm::new(LlmSettings::default(), Arc::new(OllamaLoader));
        self.engine(Arc::new(llm), 10)
    }
}

/// Echoes how many context logs it received.
struct CountingGenerator {
    seen: Mutex<Vec<usize>>,
}

#[async_trait]
impl GenerationProvider for CountingGenerator {
    async fn generate(&self, _question: &str, context: &[RetrievedCandidate]) -> Result<String, GenerationUnavailable> {
        self.seen.lock().unwrap().push(context.len());
        Ok(format!("Saw {} logs.", context.len()))
    }

    fn availability(&self) -> Availability {
        Availability::Ready
    }
}

#[tokio::test]
async fn test_example_scenario_falls_back_without_model() {
    let fixture = Fixture::new();
    fixture.add("auth-api", "error", "User 501 failed login", 1).await;
    fixture.add("billing", "info", "Invoice 77 paid", 2).await;

    let engine = fixture.unconfigured_engine();
    let response = engine
        .answer("why did user 501 fail to log in", &QueryFilters::default(), 5)
        .await
        .unwrap();

    assert!(response.answer.starts_with(UNCONFIGURED_REASON));
    assert!(!response.generated);
    assert!(response
        .answer
        .lines()
        .any(|line| line.contains("auth-api") && line.contains("ERROR") && line.contains("User 501 failed login")));
    assert_eq!(response.requested_k, 5);
    assert_eq!(response.used_k, 2);

    // every candidate is listed, in retrieval order
    let listed: Vec<&str> = response.answer.lines().filter(|l| l.starts_with("- ")).collect();
    assert_eq!(listed.len(), response.candidates.len());
    for (line, candidate) in listed.iter().zip(&response.candidates) {
        assert!(line.ends_with(&candidate.record.message));
    }
}

#[tokio::test]
async fn test_no_candidates_returns_fixed_message() {
    let fixture = Fixture::new();
    fixture.add("auth-api", "ERROR", "User 501 failed login", 1).await;

    let filters = QueryFilters {
        service: Some("does-not-exist".to_string()),
        ..Default::default()
    };
    let response = fixture.unconfigured_engine().answer("anything", &filters, 5).await.unwrap();

    assert_eq!(response.answer, NO_LOGS_ANSWER);
    assert_eq!(response.used_k, 0);
    assert_eq!(response.requested_k, 5);
    assert!(response.candidates.is_empty());
}

#[tokio::test]
async fn test_round_trip_retrieves_ingested_message_first() {
    let fixture = Fixture::new();
    fixture.add("payments", "WARN", "Card declined for order 881", 3).await;
    let id = fixture.add("gateway", "ERROR", "Upstream timeout after 30s on /checkout", 2).await;
    fixture.add("auth-api", "INFO", "Session refreshed", 1).await;

    let response = fixture
        .unconfigured_engine()
        .answer("Upstream timeout after 30s on /checkout", &QueryFilters::default(), 1)
        .await
        .unwrap();

    assert_eq!(response.used_k, 1);
    assert_eq!(response.candidates[0].record.id, id);
    assert!(response.candidates[0].distance.abs() < 1e-5);
}

#[tokio::test]
async fn test_context_window_is_independent_of_limit() {
    let fixture = Fixture::new();
    for i in 0..6 {
        fixture.add("auth-api", "ERROR", &format!("login failure {i}"), i).await;
    }
    let generator = Arc::new(CountingGenerator { seen: Mutex::new(Vec::new()) });
    let engine = fixture.engine(generator.clone(), 3);

    let response = engine.answer("login failure", &QueryFilters::default(), 6).await.unwrap();

    assert!(response.generated);
    assert_eq!(response.answer, "Saw 3 logs.");
    assert_eq!(response.used_k, 6);
    assert_eq!(response.candidates.len(), 6);
    assert_eq!(*generator.seen.lock().unwrap(), vec![3]);
}

#[tokio::test]
async fn test_results_are_monotonic_under_any_filters() {
    let fixture = Fixture::new();
    fixture.add("auth-api", "ERROR", "User 501 failed login", 50).await;
    fixture.add("auth-api", "INFO", "User 501 logged in", 40).await;
    fixture.add("auth-api", "ERROR", "Token for user 9 expired", 30).await;
    fixture.add("billing", "ERROR", "User 501 card failed", 20).await;
    fixture.add("billing", "WARN", "Retrying charge", 10).await;

    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let filter_sets = [
        QueryFilters::default(),
        QueryFilters {
            service: Some("auth-api".to_string()),
            ..Default::default()
        },
        QueryFilters {
            service: Some("auth-api".to_string()),
            level: Some("Error".to_string()),
            ..Default::default()
        },
        QueryFilters {
            start_time: Some(base - Duration::minutes(40)),
            end_time: Some(base - Duration::minutes(20)),
            ..Default::default()
        },
    ];

    let engine = fixture.unconfigured_engine();
    for filters in &filter_sets {
        let response = engine.answer("user 501 failed", filters, 10).await.unwrap();
        assert!(response.candidates.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(response.candidates.iter().all(|c| filters.matches(&c.record)));
    }

    let both = engine.answer("user 501 failed", &filter_sets[2], 10).await.unwrap();
    assert_eq!(both.used_k, 2);
    let window = engine.answer("user 501 failed", &filter_sets[3], 10).await.unwrap();
    assert_eq!(window.used_k, 3);
}

#[tokio::test]
async fn test_zero_limit_is_a_contract_violation() {
    let fixture = Fixture::new();
    let err = fixture
        .unconfigured_engine()
        .answer("anything", &QueryFilters::default(), 0)
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Retrieval(RetrievalError::InvalidLimit(0))));
}

#[test]
fn test_candidate_serializes_without_embedding() {
    let candidate = RetrievedCandidate {
        record: LogRecord {
            id: Uuid::nil(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            log_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            service: "auth-api".to_string(),
            level: "ERROR".to_string(),
            message: "m".to_string(),
            attributes: Map::new(),
        },
        distance: 0.25,
    };
    let value = serde_json::to_value(&candidate).unwrap();

    assert_eq!(value["distance"], json!(0.25));
    assert!(value["record"].get("embedding").is_none());
}
