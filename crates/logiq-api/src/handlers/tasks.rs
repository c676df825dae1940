use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::TaskStatusResponse;
use crate::state::AppState;

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, (StatusCode, String)> {
    let entry = state
        .tasks
        .get(&task_id)
        .ok_or((StatusCode::NOT_FOUND, format!("unknown task {task_id}")))?;

    Ok(Json(TaskStatusResponse {
        task_id: task_id.to_string(),
        status: entry.status,
        updated_at: entry.updated_at,
    }))
}
