// Embedding providers
// Turn text into a unit-length 384-d vector. The model is loaded on first use.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use logiq_core::{Embedding, EMBEDDING_DIM};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

use crate::lazy::{LazyResource, LoadState};

/// Name that selects the [`HashingEmbedder`] backend.
pub const HASHING_MODEL: &str = "hashing";

#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    /// The model could not be loaded; every later call fails the same way.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// A single call failed; the next one may succeed.
    #[error("embedding failed: {0}")]
    Failed(String),
}

impl EmbeddingError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, EmbeddingError::Unavailable(_))
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Deterministic for a given text and model.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    fn model_name(&self) -> &str;
}

/// Maps a configured model name onto a fastembed model with 384 dimensions.
pub fn resolve_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" | "Qdrant/all-MiniLM-L6-v2-onnx" => {
            Some(EmbeddingModel::AllMiniLML6V2)
        }
        "sentence-transformers/all-MiniLM-L12-v2" | "all-MiniLM-L12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        _ => None,
    }
}

/// Builds the provider named by `model_name`.
pub fn build_embedder(model_name: &str) -> Arc<dyn EmbeddingProvider> {
    if model_name == HASHING_MODEL {
        Arc::new(HashingEmbedder::new())
    } else {
        Arc::new(FastEmbedProvider::new(model_name))
    }
}

// FASTEMBED (ONNX)

/// Sentence-transformer embeddings through fastembed.
///
/// A fastembed session needs `&mut` access while encoding, so the loaded
/// model sits behind a mutex that is held only for the encode call itself.
pub struct FastEmbedProvider {
    model_name: String,
    model: LazyResource<Mutex<TextEmbedding>>,
}

impl FastEmbedProvider {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model: LazyResource::new(),
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.model.state()
    }

    async fn loaded(&self) -> Result<Arc<Mutex<TextEmbedding>>, EmbeddingError> {
        let name = self.model_name.clone();
        self.model
            .get_or_load(|| async move {
                let Some(model) = resolve_model(&name) else {
                    error!(model = %name, "Unsupported embedding model");
                    return Err(format!("unsupported embedding model '{name}'"));
                };

                info!(model = %name, "Loading embedding model...");
                let loaded = tokio::task::spawn_blocking(move || TextEmbedding::try_new(InitOptions::new(model)))
                    .await
                    .map_err(|e| e.to_string())?;

                match loaded {
                    Ok(model) => {
                        info!(model = %name, "Embedding model loaded");
                        Ok(Arc::new(Mutex::new(model)))
                    }
                    Err(e) => {
                        error!(model = %name, error = %e, "Failed to load embedding model");
                        Err(e.to_string())
                    }
                }
            })
            .await
            .map_err(EmbeddingError::Unavailable)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let model = self.loaded().await?;
        let input = text.to_string();

        let raw = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Failed("embedding model lock poisoned".to_string()))?;
            let embeddings = model
                .embed(vec![input], None)
                .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::Failed("no embedding returned".to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Failed(e.to_string()))??;

        Embedding::from_raw(raw).map_err(|e| EmbeddingError::Unavailable(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// HASHING (no model files)

/// Feature-hashed bag of words.
///
/// Lowercased alphanumeric tokens are hashed (FNV-1a) into 384 buckets with a
/// sign bit, then normalized. Identical texts get identical vectors and texts
/// sharing words land close together.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }

    pub fn embed_sync(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % EMBEDDING_DIM as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }
        // no tokens (or tokens cancelling out) still needs a valid vector
        if values.iter().all(|v| *v == 0.0) {
            values[0] = 1.0;
        }

        Embedding::from_raw(values).map_err(|e| EmbeddingError::Failed(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_sync(text)
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
