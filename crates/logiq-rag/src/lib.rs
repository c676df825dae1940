// Logiq RAG engine - embeddings, log storage, retrieval and answer synthesis

pub mod embedding;
pub mod engine;
pub mod generation;
pub mod lazy;
pub mod llm_client;
pub mod memory_store;
pub mod ollama_client;
pub mod qdrant_store;
pub mod retrieval;
pub mod store;

pub use embedding::{build_embedder, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingEmbedder, HASHING_MODEL};
pub use engine::{fallback_answer, RagConfig, RagEngine, RagError, RagResponse, NO_LOGS_ANSWER};
pub use generation::{Availability, GenerationProvider, GenerationUnavailable, LocalLlm};
pub use llm_client::{LlmClient, LlmError, ModelLoader};
pub use memory_store::MemoryLogStore;
pub use ollama_client::{OllamaClient, OllamaLoader};
pub use qdrant_store::QdrantLogStore;
pub use retrieval::{RetrievalEngine, RetrievalError};
pub use store::{LogStore, StoreError};
