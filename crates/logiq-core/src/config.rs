//! Runtime settings shared by the API and the worker
//!
//! Resolution order: built-in defaults, then an optional TOML file named by
//! `LOGIQ_CONFIG`, then individual environment variables.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {key}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub log_level: String,
    pub bind_addr: String,

    // queue
    pub nats_url: String,
    pub ingest_subject: String,
    /// JetStream stream that holds ingestion tasks until a worker acks them
    pub ingest_stream: String,

    // vector store
    pub qdrant_url: String,
    pub collection: String,

    pub embedding_model_name: String,

    pub llm: LlmSettings,

    /// default `limit` for queries that do not send one
    pub retrieval_top_k: usize,
    /// how many retrieved logs are handed to the LLM
    pub max_context_logs: usize,

    pub worker: WorkerSettings,

    // task board
    /// finished tasks are forgotten this long after their last report
    pub task_retention_secs: u64,
    pub max_tracked_tasks: usize,
}

/// Local LLM parameters, fixed when the provider is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model to serve; `None` leaves generation unconfigured.
    pub model: Option<String>,
    pub ollama_url: String,
    pub n_ctx: u32,
    /// 0 lets the runtime pick.
    pub n_threads: u32,
    pub n_gpu_layers: u32,
    pub batch_size: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub task_time_limit_secs: u64,
    /// deliveries of one task before the stream stops redelivering it
    pub max_deliveries: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Logiq".to_string(),
            log_level: "info".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            nats_url: "localhost:4222".to_string(),
            ingest_subject: "logs.ingest".to_string(),
            ingest_stream: "LOGIQ_INGEST".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "logs".to_string(),
            embedding_model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            llm: LlmSettings::default(),
            retrieval_top_k: 5,
            max_context_logs: 10,
            worker: WorkerSettings::default(),
            task_retention_secs: 3_600,
            max_tracked_tasks: 100_000,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: None,
            ollama_url: "http://localhost:11434".to_string(),
            n_ctx: 4096,
            n_threads: 0,
            n_gpu_layers: 0,
            batch_size: 512,
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 600_000,
            task_time_limit_secs: 300,
            max_deliveries: 3,
        }
    }
}

impl WorkerSettings {
    pub fn task_time_limit(&self) -> Duration {
        Duration::from_secs(self.task_time_limit_secs)
    }

    /// How long the queue waits for an ack before redelivering. Longer than the
    /// time limit, so only a worker that died mid-task triggers a redelivery.
    pub fn ack_wait(&self) -> Duration {
        self.task_time_limit() + Duration::from_secs(30)
    }
}

impl Settings {
    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup("LOGIQ_CONFIG") {
            Some(path) if !path.is_empty() => load_file(path)?,
            _ => Settings::default(),
        };
        settings.apply_overrides(&lookup)?;
        Ok(settings)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        set_string(&mut self.app_name, lookup, "LOGIQ_APP_NAME");
        set_string(&mut self.log_level, lookup, "LOGIQ_LOG_LEVEL");
        set_string(&mut self.bind_addr, lookup, "LOGIQ_BIND_ADDR");
        set_string(&mut self.nats_url, lookup, "NATS_URL");
        set_string(&mut self.ingest_subject, lookup, "INGEST_SUBJECT");
        set_string(&mut self.ingest_stream, lookup, "INGEST_STREAM");
        set_string(&mut self.qdrant_url, lookup, "QDRANT_URL");
        set_string(&mut self.collection, lookup, "QDRANT_COLLECTION");
        set_string(&mut self.embedding_model_name, lookup, "EMBEDDING_MODEL_NAME");

        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model).filter(|m| !m.trim().is_empty());
        }
        set_string(&mut self.llm.ollama_url, lookup, "OLLAMA_URL");
        set_parsed(&mut self.llm.n_ctx, lookup, "LLM_N_CTX")?;
        set_parsed(&mut self.llm.n_threads, lookup, "LLM_N_THREADS")?;
        set_parsed(&mut self.llm.n_gpu_layers, lookup, "LLM_N_GPU_LAYERS")?;
        set_parsed(&mut self.llm.batch_size, lookup, "LLM_BATCH_SIZE")?;
        set_parsed(&mut self.llm.temperature, lookup, "LLM_TEMPERATURE")?;
        set_parsed(&mut self.llm.top_p, lookup, "LLM_TOP_P")?;
        set_parsed(&mut self.llm.max_tokens, lookup, "LLM_MAX_TOKENS")?;

        set_parsed(&mut self.retrieval_top_k, lookup, "RETRIEVAL_TOP_K")?;
        set_parsed(&mut self.max_context_logs, lookup, "MAX_CONTEXT_LOGS")?;

        set_parsed(&mut self.worker.concurrency, lookup, "WORKER_CONCURRENCY")?;
        set_parsed(&mut self.worker.max_retries, lookup, "INGEST_MAX_RETRIES")?;
        set_parsed(&mut self.worker.backoff_base_ms, lookup, "INGEST_BACKOFF_BASE_MS")?;
        set_parsed(&mut self.worker.backoff_max_ms, lookup, "INGEST_BACKOFF_MAX_MS")?;
        set_parsed(&mut self.worker.task_time_limit_secs, lookup, "INGEST_TASK_TIME_LIMIT_SECS")?;
        set_parsed(&mut self.worker.max_deliveries, lookup, "INGEST_MAX_DELIVERIES")?;

        set_parsed(&mut self.task_retention_secs, lookup, "TASK_RETENTION_SECS")?;
        set_parsed(&mut self.max_tracked_tasks, lookup, "MAX_TRACKED_TASKS")?;
        Ok(())
    }
}

/// Load settings from a TOML file.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}

fn set_string<F>(target: &mut String, lookup: &F, key: &str)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *target = value;
    }
}

fn set_parsed<T, F>(target: &mut T, lookup: &F, key: &str) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: value.clone(),
        })?;
    }
    Ok(())
}
