use axum::{
    routing::{get, post},
    Router,
};
use logiq_core::config::Settings;
use logiq_core::task::results_subject;
use logiq_rag::{
    build_embedder, EmbeddingProvider, LocalLlm, LogStore, OllamaLoader, QdrantLogStore, RagConfig, RagEngine,
    RetrievalEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod handlers;
mod models;
mod queue;
mod state;

use handlers::{get_task, health_check, ingest_log, query_logs};
use queue::{follow_reports, NatsTaskQueue};
use state::{AppState, TaskBoard};

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/ingest", post(ingest_log))
        .route("/query", post(query_logs))
        .route("/tasks/{task_id}", get(get_task))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    //logging setup
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)))
        .init();

    // connect to NATS
    info!(url = %settings.nats_url, "Connecting to NATS...");
    let nats = async_nats::connect(settings.nats_url.as_str()).await?;
    info!("Connected to NATS!");

    // Connect to Qdrant
    info!(url = %settings.qdrant_url, collection = %settings.collection, "Connecting to Qdrant...");
    let store = Arc::new(QdrantLogStore::connect(&settings.qdrant_url, settings.collection.clone())?);
    store.ensure_schema().await?;
    info!("Connected to Qdrant!");

    // Providers load lazily on first use
    let embedder = build_embedder(&settings.embedding_model_name);
    let generator = Arc::new(LocalLlm::new(settings.llm.clone(), Arc::new(OllamaLoader)));
    match settings.llm.model.as_deref() {
        Some(model) => info!(model, url = %settings.llm.ollama_url, "LLM configured"),
        None => info!("No LLM configured, answers will be extractive summaries"),
    }
    info!(model = embedder.model_name(), "Embedding provider configured");

    let rag_engine = RagEngine::new(
        RagConfig {
            max_context_logs: settings.max_context_logs,
        },
        embedder,
        RetrievalEngine::new(store),
        generator,
    );

    let queue = NatsTaskQueue::connect(nats.clone(), &settings.ingest_stream, settings.ingest_subject.clone()).await?;

    let tasks = Arc::new(TaskBoard::from_settings(&settings));
    let reports = results_subject(&settings.ingest_subject);
    {
        let (nats, tasks) = (nats.clone(), tasks.clone());
        tokio::spawn(async move {
            if let Err(e) = follow_reports(nats, reports, tasks).await {
                error!("Task report subscription failed: {}", e);
            }
        });
    }
    {
        let tasks = tasks.clone();
        let period = settings.task_retention().min(Duration::from_secs(60)).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let pruned = tasks.prune(chrono::Utc::now());
                if pruned > 0 {
                    debug!(pruned, remaining = tasks.len(), "Pruned task board");
                }
            }
        });
    }

    let addr = settings.bind_addr.clone();
    let app_name = settings.app_name.clone();
    let state = Arc::new(AppState {
        queue: Arc::new(queue),
        rag_engine,
        tasks,
        settings,
    });

    // Server start
    info!("Starting {} on {}", app_name, addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
