// Generation provider
// Wraps the local LLM: prompt assembly, sampling, stop-marker truncation and
// the load-once availability state machine.

use async_trait::async_trait;
use logiq_core::config::LlmSettings;
use logiq_core::RetrievedCandidate;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::lazy::{LazyResource, LoadState};
use crate::llm_client::{CompletionRequest, LlmClient, ModelLoader};

pub const SYSTEM_PROMPT: &str = "You are Logiq, an assistant that explains application logs clearly and accurately. \
Use only the provided logs as evidence.";

/// Role markers the model may echo; generation is cut at the first one.
pub const STOP_MARKERS: [&str; 3] = ["System:", "User:", "Assistant:"];

pub const UNCONFIGURED_REASON: &str = "No LLM model configured.";
pub const EMPTY_ANSWER_REASON: &str = "Unable to access the configured LLM.";

/// Generation could not produce an answer; carries the reason shown to users.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct GenerationUnavailable {
    pub reason: String,
}

impl GenerationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// No model configured; never loads.
    Unconfigured,
    /// Configured, first call has not happened yet.
    NotLoaded,
    Ready,
    /// Load failed; stays this way for the process lifetime.
    LoadFailed(String),
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Unconfigured => f.write_str("unconfigured"),
            Availability::NotLoaded => f.write_str("not_loaded"),
            Availability::Ready => f.write_str("ready"),
            Availability::LoadFailed(reason) => write!(f, "load_failed: {reason}"),
        }
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Answer `question` from `context`, or explain why that is not possible.
    async fn generate(&self, question: &str, context: &[RetrievedCandidate]) -> Result<String, GenerationUnavailable>;

    fn availability(&self) -> Availability;
}

/// Assemble the prompt: system preamble, question, one bullet per log.
pub fn build_prompt(question: &str, context: &[RetrievedCandidate]) -> String {
    let mut parts = vec![format!("System: {SYSTEM_PROMPT}"), format!("User question: {question}")];

    if !context.is_empty() {
        let lines: Vec<String> = context
            .iter()
            .map(|c| format!("- {}", c.record.prompt_line()))
            .collect();
        parts.push(format!("Relevant logs:\n{}", lines.join("\n")));
    }
    parts.push("Respond with a concise answer that references the logs.".to_string());
    parts.join("\n\n")
}

/// Cuts `text` at the earliest echoed role marker and trims it.
pub fn truncate_at_markers(text: &str) -> &str {
    let cut = STOP_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    text[..cut].trim()
}

/// The locally hosted LLM, loaded on first use.
pub struct LocalLlm {
    settings: LlmSettings,
    loader: Arc<dyn ModelLoader>,
    client: LazyResource<dyn LlmClient>,
}

impl LocalLlm {
    pub fn new(settings: LlmSettings, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            settings,
            loader,
            client: LazyResource::new(),
        }
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    async fn ensure_model(&self) -> Result<Arc<dyn LlmClient>, GenerationUnavailable> {
        let Some(model) = self.settings.model.as_deref() else {
            return Err(GenerationUnavailable::new(UNCONFIGURED_REASON));
        };

        self.client
            .get_or_load(|| async {
                info!(model, "Loading LLM model...");
                match self.loader.load(model, &self.settings).await {
                    Ok(client) => {
                        info!(model, provider = client.provider(), "LLM model loaded");
                        Ok(client)
                    }
                    Err(e) => {
                        error!(model, error = %e, "Failed to load LLM model; falling back to extractive summaries");
                        Err(format!("Failed to load LLM model '{model}': {e}."))
                    }
                }
            })
            .await
            .map_err(GenerationUnavailable::new)
    }
}

#[async_trait]
impl GenerationProvider for LocalLlm {
    async fn generate(&self, question: &str, context: &[RetrievedCandidate]) -> Result<String, GenerationUnavailable> {
        let client = self.ensure_model().await?;
        let prompt = build_prompt(question, context);

        let request = CompletionRequest {
            prompt: &prompt,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            stop: &STOP_MARKERS,
        };

        let text = match client.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, model = client.model(), "LLM completion failed");
                return Err(GenerationUnavailable::new(format!("LLM completion failed: {e}.")));
            }
        };

        let answer = truncate_at_markers(&text);
        if answer.is_empty() {
            return Err(GenerationUnavailable::new(EMPTY_ANSWER_REASON));
        }
        Ok(answer.to_string())
    }

    fn availability(&self) -> Availability {
        if self.settings.model.is_none() {
            return Availability::Unconfigured;
        }
        match self.client.state() {
            LoadState::NotLoaded => Availability::NotLoaded,
            LoadState::Ready => Availability::Ready,
            LoadState::Failed(reason) => Availability::LoadFailed(reason),
        }
    }
}
