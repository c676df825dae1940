// Ollama local LLM client
// The model runs on a local Ollama server; context size, threads, GPU offload
// and batch size are fixed when the client is built.

use async_trait::async_trait;
use logiq_core::config::LlmSettings;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::llm_client::{CompletionRequest, LlmClient, LlmError, ModelLoader};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    runtime: RuntimeOptions,
}

/// Per-model runtime knobs, the same for every call.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    pub num_ctx: u32,
    /// `None` lets Ollama pick.
    pub num_thread: Option<u32>,
    pub num_gpu: u32,
    pub num_batch: u32,
}

impl From<&LlmSettings> for RuntimeOptions {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            num_ctx: settings.n_ctx,
            num_thread: Some(settings.n_threads).filter(|n| *n > 0),
            num_gpu: settings.n_gpu_layers,
            num_batch: settings.batch_size,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    raw: bool,
    options: GenerateOptions<'a>,
}

#[derive(Serialize)]
struct GenerateOptions<'a> {
    num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_thread: Option<u32>,
    num_gpu: u32,
    num_batch: u32,
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    stop: &'a [&'a str],
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, runtime: RuntimeOptions) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            runtime,
        }
    }

    fn generate_body<'a>(&'a self, request: &'a CompletionRequest<'a>) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt: request.prompt,
            stream: false,
            raw: true,
            options: GenerateOptions {
                num_ctx: self.runtime.num_ctx,
                num_thread: self.runtime.num_thread,
                num_gpu: self.runtime.num_gpu,
                num_batch: self.runtime.num_batch,
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
                stop: request.stop,
            },
        }
    }

    /// Checks that the server knows the model.
    pub async fn verify_model(&self) -> Result<(), LlmError> {
        let url = format!("{}/api/show", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ShowRequest { model: &self.model })
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotFound(self.model.clone()));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(error_text));
        }
        Ok(())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = self.generate_body(request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(error_text));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(result.response)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "ollama"
    }
}

/// Loads models by asking the local Ollama server for them.
#[derive(Debug, Clone, Default)]
pub struct OllamaLoader;

#[async_trait]
impl ModelLoader for OllamaLoader {
    async fn load(&self, model: &str, settings: &LlmSettings) -> Result<Arc<dyn LlmClient>, LlmError> {
        let client = OllamaClient::new(&settings.ollama_url, model, RuntimeOptions::from(settings));
        client.verify_model().await?;
        info!(model, url = %settings.ollama_url, "Ollama model available");
        Ok(Arc::new(client))
    }
}
