// LLM client traits
// A loader turns settings into a ready model client; the client serves completions.

use async_trait::async_trait;
use logiq_core::config::LlmSettings;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("model '{0}' is not available")]
    ModelNotFound(String),
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: &'a [&'a str],
}

/// A loaded model that can complete prompts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;

    fn model(&self) -> &str;

    fn provider(&self) -> &str;
}

/// Loads a model once; the result is shared for the process lifetime.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model: &str, settings: &LlmSettings) -> Result<Arc<dyn LlmClient>, LlmError>;
}
