// RAG engine
// Orchestrates: Embed question -> Filtered retrieval -> Context window -> LLM answer,
// with an extractive fallback whenever generation is unavailable.

use logiq_core::{format_timestamp, QueryFilters, RetrievedCandidate};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::generation::GenerationProvider;
use crate::retrieval::{RetrievalEngine, RetrievalError};

pub const NO_LOGS_ANSWER: &str = "No relevant logs were found to answer the question.";

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Search failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

// RAG engine configuration
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// How many of the best candidates are handed to the model.
    pub max_context_logs: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { max_context_logs: 10 }
    }
}

/// Answer plus every retrieved candidate, best match first.
#[derive(Debug, Clone)]
pub struct RagResponse {
    pub answer: String,
    pub candidates: Vec<RetrievedCandidate>,
    pub requested_k: usize,
    pub used_k: usize,
    /// `false` when the answer is the extractive fallback.
    pub generated: bool,
}

pub struct RagEngine {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalEngine,
    generator: Arc<dyn GenerationProvider>,
}

impl RagEngine {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalEngine,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            config,
            embedder,
            retrieval,
            generator,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn generator(&self) -> &Arc<dyn GenerationProvider> {
        &self.generator
    }

    /// Answer a natural language question about the stored logs.
    ///
    /// Only embedding and retrieval failures are errors; generation trouble
    /// always degrades to the extractive fallback.
    pub async fn answer(&self, question: &str, filters: &QueryFilters, limit: usize) -> Result<RagResponse, RagError> {
        let query_vector = self.embedder.embed(question).await?;
        let candidates = self.retrieval.search(&query_vector, filters, limit).await?;
        let used_k = candidates.len();

        if candidates.is_empty() {
            info!(limit, "No candidates retrieved");
            return Ok(RagResponse {
                answer: NO_LOGS_ANSWER.to_string(),
                candidates,
                requested_k: limit,
                used_k,
                generated: false,
            });
        }

        let context = &candidates[..self.config.max_context_logs.min(used_k)];
        let (answer, generated) = match self.generator.generate(question, context).await {
            Ok(answer) => (answer, true),
            Err(unavailable) => {
                warn!(reason = %unavailable, "Generation unavailable, returning extractive summary");
                (fallback_answer(&unavailable.reason, question, &candidates), false)
            }
        };

        info!(requested_k = limit, used_k, context = context.len(), generated, "Query answered");
        Ok(RagResponse {
            answer,
            candidates,
            requested_k: limit,
            used_k,
            generated,
        })
    }
}

/// Deterministic summary listing every candidate in retrieval order.
pub fn fallback_answer(reason: &str, question: &str, candidates: &[RetrievedCandidate]) -> String {
    if candidates.is_empty() {
        return NO_LOGS_ANSWER.to_string();
    }

    let mut lines = vec![
        format!("{reason} Returning raw log details instead."),
        format!("Question: {question}"),
        "Top matching logs:".to_string(),
    ];
    lines.extend(candidates.iter().map(|c| {
        format!(
            "- {} [{}:{}] {}",
            format_timestamp(&c.record.log_timestamp),
            c.record.service,
            c.record.level,
            c.record.message
        )
    }));
    lines.join("\n")
}
