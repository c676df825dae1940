use axum::{extract::State, Json};
use logiq_rag::{EmbeddingProvider, GenerationProvider};
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Readiness ping. Reports provider state without loading anything.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        llm: state.rag_engine.generator().availability().to_string(),
        embedding_model: state.rag_engine.embedder().model_name().to_string(),
    })
}
