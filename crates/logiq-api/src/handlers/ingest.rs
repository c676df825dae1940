use axum::{extract::State, http::StatusCode, Json};
use logiq_core::task::{TaskEnvelope, TaskReport, TaskStatus};
use logiq_core::IngestPayload;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::IngestResponse;
use crate::state::AppState;

pub async fn ingest_log(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestPayload>,
) -> Result<(StatusCode, Json<IngestResponse>), (StatusCode, String)> {
    let envelope = TaskEnvelope::new(payload);
    let task_id = envelope.task_id;

    // registered first so an early worker report is never overwritten
    state.tasks.insert_pending(task_id);

    if let Err(e) = state.queue.enqueue(&envelope).await {
        error!(%task_id, "Failed to enqueue log: {}", e);
        state.tasks.apply(TaskReport::new(
            task_id,
            TaskStatus::Failed {
                error: e.to_string(),
                attempts: 0,
            },
        ));
        return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
    }

    info!(
        %task_id,
        service = %envelope.payload.service,
        level = %envelope.payload.level,
        "Log published to NATS"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "accepted".to_string(),
            task_id: task_id.to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{state_with, RecordingQueue};
    use logiq_rag::MemoryLogStore;
    use serde_json::json;

    fn payload() -> IngestPayload {
        serde_json::from_value(json!({
            "service": "auth-api",
            "level": "error",
            "message": "User 501 failed login",
            "attributes": {"user_id": 501},
            "region": "eu-west-1"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_enqueues_and_returns_task_id() {
        let queue = Arc::new(RecordingQueue::default());
        let state = state_with(Arc::new(MemoryLogStore::new()), queue.clone());

        let (status, Json(body)) = ingest_log(State(state.clone()), Json(payload())).await.unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.status, "accepted");

        let sent = queue.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].task_id.to_string(), body.task_id);
        assert_eq!(sent[0].payload.extra.get("region"), Some(&json!("eu-west-1")));
        assert_eq!(state.tasks.get(&sent[0].task_id).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_reported() {
        let queue = Arc::new(RecordingQueue {
            fail: true,
            ..Default::default()
        });
        let state = state_with(Arc::new(MemoryLogStore::new()), queue);

        let (status, message) = ingest_log(State(state), Json(payload())).await.unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("no responders"));
    }
}
