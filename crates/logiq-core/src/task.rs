//! Messages exchanged over the ingestion queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::IngestPayload;

/// Subject suffix the workers publish task reports on.
pub const RESULTS_SUFFIX: &str = "results";

/// Durable consumer shared by all ingestion workers; each task goes to one of them.
pub const WORKER_CONSUMER: &str = "logiq-workers";

pub fn results_subject(ingest_subject: &str) -> String {
    format!("{ingest_subject}.{RESULTS_SUFFIX}")
}

/// One unit of ingestion work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub payload: IngestPayload,
}

impl TaskEnvelope {
    pub fn new(payload: IngestPayload) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Started,
    Succeeded { log_id: Uuid, attempts: u32 },
    Failed { error: String, attempts: u32 },
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Succeeded { .. } | TaskStatus::Failed { .. })
    }
}

/// Task id of a message that does not decode as a [`TaskEnvelope`], if it carries one.
pub fn salvage_task_id(raw: &[u8]) -> Option<Uuid> {
    let value: serde_json::Value = serde_json::from_slice(raw).ok()?;
    value.get("task_id")?.as_str()?.parse().ok()
}

/// Status update published by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub reported_at: DateTime<Utc>,
}

impl TaskReport {
    pub fn new(task_id: Uuid, status: TaskStatus) -> Self {
        Self {
            task_id,
            status,
            reported_at: Utc::now(),
        }
    }
}
