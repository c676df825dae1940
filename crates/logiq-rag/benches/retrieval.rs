//! Benchmarks for in-memory retrieval
//! Run: cargo bench -p logiq-rag --bench retrieval

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logiq_core::{LogRecord, QueryFilters, StoredLog};
use logiq_rag::{HashingEmbedder, LogStore, MemoryLogStore, RetrievalEngine};
use serde_json::Map;
use std::hint::black_box;
use std::sync::Arc;
use uuid::Uuid;

const SERVICES: &[&str] = &["auth-api", "payments", "gateway", "orders"];
const LEVELS: &[&str] = &["INFO", "WARN", "ERROR"];
const MESSAGES: &[&str] = &[
    "User {} failed login: invalid password",
    "Payment {} declined by issuer",
    "Upstream timeout after 30s for request {}",
    "Order {} shipped to warehouse",
    "Connection refused to redis for session {}",
];

fn seeded_engine(rt: &tokio::runtime::Runtime, size: usize) -> RetrievalEngine {
    let embedder = HashingEmbedder::new();
    let store = Arc::new(MemoryLogStore::new());

    rt.block_on(async {
        for i in 0..size {
            let message = MESSAGES[i % MESSAGES.len()].replace("{}", &i.to_string());
            let record = LogRecord {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                log_timestamp: Utc::now(),
                service: SERVICES[i % SERVICES.len()].to_string(),
                level: LEVELS[i % LEVELS.len()].to_string(),
                message: message.clone(),
                attributes: Map::new(),
            };
            if let Ok(embedding) = embedder.embed_sync(&message) {
                let _ = store.insert(StoredLog::new(record, embedding)).await;
            }
        }
    });

    RetrievalEngine::new(store)
}

fn bench_search(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let query = HashingEmbedder::new().embed_sync("why did user 501 fail to log in").unwrap();
    let filtered = QueryFilters {
        service: Some("auth-api".to_string()),
        level: Some("error".to_string()),
        ..Default::default()
    };

    let mut group = c.benchmark_group("memory_search");
    for size in [100usize, 1_000, 10_000] {
        let engine = seeded_engine(&rt, size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("unfiltered", size), &engine, |b, engine| {
            b.iter(|| rt.block_on(engine.search(black_box(&query), &QueryFilters::default(), 5)))
        });
        group.bench_with_input(BenchmarkId::new("service_and_level", size), &engine, |b, engine| {
            b.iter(|| rt.block_on(engine.search(black_box(&query), &filtered, 5)))
        });
    }
    group.finish();
}

fn bench_hashing_embedder(c: &mut Criterion) {
    let embedder = HashingEmbedder::new();
    c.bench_function("hashing_embed", |b| {
        b.iter(|| embedder.embed_sync(black_box("Upstream timeout after 30s for request 4711")))
    });
}

criterion_group!(benches, bench_search, bench_hashing_embedder);
criterion_main!(benches);
