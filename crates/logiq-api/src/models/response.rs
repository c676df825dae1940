use chrono::{DateTime, Utc};
use logiq_core::task::TaskStatus;
use logiq_core::{LogRecord, RetrievedCandidate};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub task_id: String,
}

/// A stored log as returned by the API, without its vector.
#[derive(Debug, Serialize)]
pub struct LogRecordOut {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub log_timestamp: DateTime<Utc>,
    pub service: String,
    pub level: String,
    pub message: String,
    pub attributes: Map<String, Value>,
}

impl From<&LogRecord> for LogRecordOut {
    fn from(r: &LogRecord) -> Self {
        Self {
            id: r.id.to_string(),
            created_at: r.created_at,
            log_timestamp: r.log_timestamp,
            service: r.service.clone(),
            level: r.level.clone(),
            message: r.message.clone(),
            attributes: r.attributes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogQueryContext {
    /// Cosine distance to the question; lower is closer.
    pub match_score: f32,
    pub log: LogRecordOut,
}

impl From<&RetrievedCandidate> for LogQueryContext {
    fn from(c: &RetrievedCandidate) -> Self {
        Self {
            match_score: c.distance,
            log: (&c.record).into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogQueryResponse {
    pub answer: String,
    pub logs: Vec<LogRecordOut>,
    pub contexts: Vec<LogQueryContext>,
    pub requested_k: usize,
    pub used_k: usize,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub llm: String,
    pub embedding_model: String,
}
