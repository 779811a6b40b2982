//! Per-model clients
//!
//! A [`ModelClient`] is one analyst seat in the ensemble: a provider bound to
//! a fixed model id, temperature and token budget. Clients are built once and
//! shared read-only across concurrent analyses.

use crate::{CompletionRequest, LLMError, LLMProvider, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Model id and sampling settings for one analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider-specific model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl ModelSpec {
    /// Create a spec with the default token budget
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens: 512,
        }
    }

    /// Set the token budget
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Prompt in, text out
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one system + user prompt pair and return the answer text
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Model identifier this client talks to
    fn model_id(&self) -> &str;
}

/// [`ModelClient`] backed by an [`LLMProvider`]
pub struct LlmModelClient {
    provider: Arc<dyn LLMProvider>,
    spec: ModelSpec,
}

impl LlmModelClient {
    /// Bind a provider to a model spec
    pub fn new(provider: Arc<dyn LLMProvider>, spec: ModelSpec) -> Self {
        Self { provider, spec }
    }

    /// The bound spec
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    #[instrument(skip(self, system_prompt, user_prompt), fields(model = %self.spec.model))]
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = CompletionRequest::new(&self.spec.model)
            .with_system(system_prompt)
            .with_user(user_prompt)
            .with_temperature(self.spec.temperature)
            .with_max_tokens(self.spec.max_tokens);

        let response = self.provider.complete(request).await?;
        debug!(provider = self.provider.name(), "completion received");

        response
            .message
            .text()
            .map(ToString::to_string)
            .ok_or_else(|| LLMError::EmptyCompletion(self.spec.model.clone()))
    }

    fn model_id(&self) -> &str {
        &self.spec.model
    }
}
