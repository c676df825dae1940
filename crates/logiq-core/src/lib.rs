//! Core types for the Logiq log intelligence pipeline
//! Shared data structures used by the API, the RAG engine and the ingestion worker.

pub mod attributes;
pub mod config;
pub mod embedding;
pub mod task;
pub mod timestamp;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub use attributes::{merge_attributes, RESERVED_KEYS};
pub use embedding::{cosine_distance, Embedding, EmbeddingShapeError, EMBEDDING_DIM};
pub use timestamp::TimestampInput;

/// Longest service name the stores accept.
pub const MAX_SERVICE_LEN: usize = 255;
/// Longest level string the stores accept.
pub const MAX_LEVEL_LEN: usize = 50;

// INGEST PAYLOAD (what the queue carries)

/// Log payload as delivered to the ingestion task.
///
/// Any top-level field that is not one of the typed ones lands in `extra`
/// and is folded into the stored attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub service: String,

    pub level: String,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_timestamp: Option<TimestampInput>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IngestPayload {
    pub fn new(
        service: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            level: level.into(),
            message: message.into(),
            log_timestamp: None,
            attributes: Map::new(),
            extra: Map::new(),
        }
    }

    /// Attributes combined with the open fields, explicit map wins, reserved keys removed.
    pub fn merged_attributes(&self) -> Map<String, Value> {
        merge_attributes(&self.extra, &self.attributes)
    }
}

/// Upper-cases a level for storage. Nothing else is changed.
pub fn normalize_level(level: &str) -> String {
    level.to_uppercase()
}

// LOG RECORD (durable unit)

/// A stored log, without its vector.
///
/// Records only reach storage wrapped in a [`StoredLog`], which pairs them
/// with a validated embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    pub log_timestamp: DateTime<Utc>,

    pub service: String,

    pub level: String,

    pub message: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl LogRecord {
    /// One line rendering used by prompts: `[timestamp] service level: message`.
    pub fn prompt_line(&self) -> String {
        format!(
            "[{}] {} {}: {}",
            format_timestamp(&self.log_timestamp),
            self.service,
            self.level,
            self.message
        )
    }
}

/// Sub-second digits kept on stored timestamps.
pub const STORED_SUBSEC_DIGITS: u16 = 6;

/// A record together with the embedding of its message.
#[derive(Debug, Clone)]
pub struct StoredLog {
    pub record: LogRecord,
    pub embedding: Embedding,
}

impl StoredLog {
    /// Pairs a record with its embedding. Timestamps are truncated to whole
    /// microseconds, the precision every store persists.
    pub fn new(mut record: LogRecord, embedding: Embedding) -> Self {
        record.log_timestamp = record.log_timestamp.trunc_subsecs(STORED_SUBSEC_DIGITS);
        record.created_at = record.created_at.trunc_subsecs(STORED_SUBSEC_DIGITS);
        Self { record, embedding }
    }
}

/// A record paired with its cosine distance to a query (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedCandidate {
    pub record: LogRecord,
    pub distance: f32,
}

// QUERY FILTERS

/// Optional predicates applied during retrieval, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default)]
    pub service: Option<String>,

    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.level.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }

    /// Level as it is stored, i.e. upper-cased.
    pub fn normalized_level(&self) -> Option<String> {
        self.level.as_deref().map(normalize_level)
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(service) = &self.service {
            if &record.service != service {
                return false;
            }
        }
        if let Some(level) = self.normalized_level() {
            if record.level != level {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.log_timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.log_timestamp > end {
                return false;
            }
        }
        true
    }
}

/// RFC 3339 with an explicit `+00:00` offset.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}
