use std::sync::Arc;

use logiq_core::config::Settings;
use logiq_core::task::results_subject;
use logiq_rag::{build_embedder, EmbeddingProvider, QdrantLogStore};
use logiq_worker::{IngestTask, QueueConfig, RetryPolicy, SchemaGuard, Worker};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    //logging setup
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)))
        .init();

    //connect to NATS
    info!(url = %settings.nats_url, "Connecting to NATS...");
    let nats = async_nats::connect(settings.nats_url.as_str()).await?;
    info!("Connected to NATS!");

    // Connect to Qdrant
    info!(url = %settings.qdrant_url, collection = %settings.collection, "Connecting to Qdrant...");
    let store = Arc::new(QdrantLogStore::connect(&settings.qdrant_url, settings.collection.clone())?);

    // loaded on first task
    let embedder = build_embedder(&settings.embedding_model_name);
    info!(model = embedder.model_name(), "Embedding provider configured");

    let guard = Arc::new(SchemaGuard::new());
    let task = IngestTask::new(embedder, store, guard);
    let policy = RetryPolicy::from_settings(&settings.worker);
    let worker = Arc::new(Worker::new(task, policy, settings.worker.task_time_limit()));

    info!(
        max_retries = policy.max_retries,
        time_limit_secs = settings.worker.task_time_limit_secs,
        "{} worker ready",
        settings.app_name
    );

    let queue = QueueConfig {
        stream: settings.ingest_stream.clone(),
        subject: settings.ingest_subject.clone(),
        results_subject: results_subject(&settings.ingest_subject),
        ack_wait: settings.worker.ack_wait(),
        max_deliveries: settings.worker.max_deliveries,
        concurrency: settings.worker.concurrency,
    };
    logiq_worker::worker::run(nats, queue, worker).await?;

    Ok(())
}
