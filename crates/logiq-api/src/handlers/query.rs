use axum::{extract::State, http::StatusCode, Json};
use logiq_rag::{RagError, RetrievalError};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::{LogQueryContext, LogQueryRequest, LogQueryResponse, LogRecordOut};
use crate::state::AppState;

fn error_status(e: &RagError) -> StatusCode {
    match e {
        RagError::Retrieval(RetrievalError::InvalidLimit(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::Embedding(e) if e.is_permanent() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn query_logs(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LogQueryRequest>,
) -> Result<Json<LogQueryResponse>, (StatusCode, String)> {
    let start = Instant::now();
    let limit = request
        .resolved_limit(state.settings.retrieval_top_k)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e))?;

    info!(query = %request.query, limit, "Query request");

    let response = state
        .rag_engine
        .answer(&request.query, &request.filters, limit)
        .await
        .map_err(|e| (error_status(&e), e.to_string()))?;

    info!(
        used_k = response.used_k,
        generated = response.generated,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Query complete"
    );

    Ok(Json(LogQueryResponse {
        logs: response.candidates.iter().map(|c| LogRecordOut::from(&c.record)).collect(),
        contexts: response.candidates.iter().map(LogQueryContext::from).collect(),
        answer: response.answer,
        requested_k: response.requested_k,
        used_k: response.used_k,
    }))
}
