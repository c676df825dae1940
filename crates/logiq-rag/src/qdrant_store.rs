// Qdrant-backed store
// One point per log: the embedding as a cosine vector plus the record fields
// as payload. Keyword indexes on service and level, an integer index on the
// log timestamp (epoch microseconds) for range filters.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use logiq_core::{format_timestamp, Embedding, LogRecord, QueryFilters, RetrievedCandidate, StoredLog, EMBEDDING_DIM};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType, Filter, PointStruct,
    Range, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{json, Map};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{validate_columns, LogStore, StoreError};

/// Payload field holding the log timestamp in epoch microseconds.
pub const TIMESTAMP_US_FIELD: &str = "log_timestamp_us";

pub struct QdrantLogStore {
    client: Qdrant,
    collection: String,
}

impl QdrantLogStore {
    pub fn connect(url: &str, collection: impl Into<String>) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(client, collection))
    }

    pub fn new(client: Qdrant, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_index(&self, field: &str, field_type: FieldType) -> Result<(), StoreError> {
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(&self.collection, field, field_type).wait(true))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for QdrantLogStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if exists {
            debug!(collection = %self.collection, "Collection already present");
        } else {
            let created = self
                .client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine)),
                )
                .await;
            if let Err(e) = created {
                // another process won the race
                if !e.to_string().contains("already exists") {
                    return Err(StoreError::Unavailable(e.to_string()));
                }
            }
        }

        // idempotent; also repairs a collection left without indexes by an interrupted bootstrap
        for (field, field_type) in payload_indexes() {
            self.ensure_index(field, field_type).await?;
        }

        info!(collection = %self.collection, dim = EMBEDDING_DIM, "Collection ready");
        Ok(())
    }

    async fn insert(&self, log: StoredLog) -> Result<Uuid, StoreError> {
        validate_columns(&log.record)?;
        let id = log.record.id;

        let payload = Payload::try_from(record_payload(&log.record))
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        let point = PointStruct::new(id.to_string(), log.embedding.into_vec(), payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(%id, "Log stored in Qdrant");
        Ok(id)
    }

    async fn search(
        &self,
        query: &Embedding,
        filters: &QueryFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>, StoreError> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query.as_slice().to_vec(), limit as u64).with_payload(true);
        if let Some(filter) = build_filter(filters) {
            search_builder = search_builder.filter(filter);
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        results
            .result
            .into_iter()
            .map(|point| {
                Ok(RetrievedCandidate {
                    record: decode_record(&point.payload)?,
                    // qdrant reports cosine similarity
                    distance: 1.0 - point.score,
                })
            })
            .collect()
    }
}

fn payload_indexes() -> [(&'static str, FieldType); 3] {
    [
        ("service", FieldType::Keyword),
        ("level", FieldType::Keyword),
        (TIMESTAMP_US_FIELD, FieldType::Integer),
    ]
}

fn record_payload(record: &LogRecord) -> serde_json::Value {
    json!({
        "log_id": record.id.to_string(),
        "service": record.service,
        "level": record.level,
        "message": record.message,
        "log_timestamp": format_timestamp(&record.log_timestamp),
        TIMESTAMP_US_FIELD: record.log_timestamp.timestamp_micros(),
        "created_at": format_timestamp(&record.created_at),
        "attributes": record.attributes,
    })
}

// Stored timestamps are whole microseconds, so an inclusive bound is exact once
// it is moved inward to the nearest whole microsecond.
fn lower_bound_micros(start: DateTime<Utc>) -> i64 {
    let floor = start.trunc_subsecs(6);
    if floor == start {
        floor.timestamp_micros()
    } else {
        (floor + Duration::microseconds(1)).timestamp_micros()
    }
}

fn upper_bound_micros(end: DateTime<Utc>) -> i64 {
    end.trunc_subsecs(6).timestamp_micros()
}

/// Translates retrieval filters into a Qdrant `must` filter.
pub fn build_filter(filters: &QueryFilters) -> Option<Filter> {
    let mut conditions = vec![];

    if let Some(service) = &filters.service {
        conditions.push(Condition::matches("service", service.clone()));
    }
    if let Some(level) = filters.normalized_level() {
        conditions.push(Condition::matches("level", level));
    }
    if filters.start_time.is_some() || filters.end_time.is_some() {
        conditions.push(Condition::range(
            TIMESTAMP_US_FIELD,
            Range {
                gte: filters.start_time.map(|t| lower_bound_micros(t) as f64),
                lte: filters.end_time.map(|t| upper_bound_micros(t) as f64),
                ..Default::default()
            },
        ));
    }

    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Result<String, StoreError> {
    payload
        .get(key)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| StoreError::Corrupt(format!("payload field '{key}' missing")))
}

fn get_time(payload: &HashMap<String, Value>, key: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = get_string(payload, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{key}: {e}")))
}

fn decode_record(payload: &HashMap<String, Value>) -> Result<LogRecord, StoreError> {
    let id = Uuid::parse_str(&get_string(payload, "log_id")?).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let attributes = match payload.get("attributes").cloned().map(Value::into_json) {
        Some(serde_json::Value::Object(map)) => map,
        None | Some(serde_json::Value::Null) => Map::new(),
        Some(other) => return Err(StoreError::Corrupt(format!("attributes is not a map: {other}"))),
    };

    Ok(LogRecord {
        id,
        created_at: get_time(payload, "created_at")?,
        log_timestamp: get_time(payload, "log_timestamp")?,
        service: get_string(payload, "service")?,
        level: get_string(payload, "level")?,
        message: get_string(payload, "message")?,
        attributes,
    })
}
