//! OpenAI-compatible chat completions provider
//!
//! Hosted inference gateways (NVIDIA NIM, vLLM, LM Studio and OpenAI itself)
//! share the `/chat/completions` wire format. The ensemble defaults to the
//! NVIDIA endpoint, which serves every model the four analysts use.
//!
//! ```no_run
//! use ensemble_llm::{CompletionRequest, LLMProvider};
//! use ensemble_llm::providers::OpenAiCompatibleProvider;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiCompatibleProvider::from_env()?;
//! let request = CompletionRequest::new("meta/llama-3.1-70b-instruct")
//!     .with_user("Hello!")
//!     .with_max_tokens(100);
//! let response = provider.complete(request).await?;
//! println!("{}", response.message.content);
//! # Ok(())
//! # }
//! ```

use crate::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider, Message, Result, StopReason,
    TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default gateway for the ensemble models
pub const DEFAULT_API_BASE: &str = "https://integrate.api.nvidia.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Bearer token
    pub api_key: String,

    /// Base URL without the `/chat/completions` suffix
    pub api_base: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiCompatibleConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create config from `NVIDIA_API_KEY` and optional `NVIDIA_BASE_URL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("NVIDIA_API_KEY").map_err(|_| {
            LLMError::Config("NVIDIA_API_KEY environment variable not set".to_string())
        })?;

        let api_base =
            std::env::var("NVIDIA_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Ok(Self {
            api_key,
            api_base,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Provider for any `/chat/completions` endpoint
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a provider with custom configuration
    pub fn with_config(config: OpenAiCompatibleConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LLMError::Config("API key must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a provider with an API key and default settings
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAiCompatibleConfig::new(api_key))
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(OpenAiCompatibleConfig::from_env()?)
    }

    /// Get the current configuration
    pub fn config(&self) -> &OpenAiCompatibleConfig {
        &self.config
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatibleProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending chat completion to {}", self.config.api_base);

        let model = request.model.clone();
        let body = ChatRequest::from(request);

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            return Err(match status.as_u16() {
                401 | 403 => LLMError::Unauthorized,
                429 => LLMError::RateLimited(error_text),
                400 => LLMError::BadRequest(error_text),
                404 => LLMError::UnknownModel(model),
                _ => LLMError::Status {
                    status: status.as_u16(),
                    body: error_text,
                },
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            LLMError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        into_completion(chat, &model)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl From<CompletionRequest> for ChatRequest {
    fn from(request: CompletionRequest) -> Self {
        // System prompt travels as the first message
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.into_iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: m.content,
        }));

        Self {
            model: request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

fn into_completion(chat: ChatResponse, model: &str) -> Result<CompletionResponse> {
    let usage = chat.usage.map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
    });

    let choice = chat
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LLMError::MalformedResponse("No choices in response".to_string()))?;

    let content = choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| LLMError::EmptyCompletion(model.to_string()))?;

    let stop_reason = choice
        .finish_reason
        .as_deref()
        .map_or(StopReason::EndTurn, StopReason::from_finish_reason);

    debug!(
        "Received response - stop_reason: {:?}, tokens: {:?}",
        stop_reason,
        usage.map(|u| u.total())
    );

    Ok(CompletionResponse {
        message: Message::assistant(content),
        stop_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiCompatibleProvider::new("test-key").unwrap();
        assert_eq!(provider.name(), "openai-compatible");
        assert_eq!(provider.config().api_key, "test-key");
        assert_eq!(provider.config().api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = OpenAiCompatibleProvider::new("  ");
        assert!(matches!(result, Err(LLMError::Config(_))));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = OpenAiCompatibleConfig::new("k").with_api_base("http://localhost:1234/v1/");
        assert_eq!(config.endpoint(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_config_from_env() {
        unsafe {
            std::env::remove_var("NVIDIA_API_KEY");
        }
        assert!(OpenAiCompatibleConfig::from_env().is_err());

        unsafe {
            std::env::set_var("NVIDIA_API_KEY", "nv-key");
            std::env::set_var("NVIDIA_BASE_URL", "https://gateway.example/v1");
        }
        let config = OpenAiCompatibleConfig::from_env().unwrap();
        assert_eq!(config.api_key, "nv-key");
        assert_eq!(config.api_base, "https://gateway.example/v1");

        unsafe {
            std::env::remove_var("NVIDIA_API_KEY");
            std::env::remove_var("NVIDIA_BASE_URL");
        }
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let request = CompletionRequest::new("m")
            .with_system("You are a risk analyst")
            .with_user("Assess TSLA")
            .with_temperature(0.7);

        let body = serde_json::to_value(ChatRequest::from(request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a risk analyst");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_response_conversion() {
        let chat: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "SIGNAL: BUY\nSTRENGTH: 80"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 12}
        }))
        .unwrap();

        let response = into_completion(chat, "m").unwrap();
        assert_eq!(response.message.content, "SIGNAL: BUY\nSTRENGTH: 80");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage.map(|u| u.total()), Some(132));
    }

    #[test]
    fn test_response_without_usage() {
        let chat: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "RISK_SCORE: 40"}, "finish_reason": "length"}]
        }))
        .unwrap();

        let response = into_completion(chat, "m").unwrap();
        assert!(response.usage.is_none());
        assert_eq!(response.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn test_empty_choices_and_content() {
        let chat: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            into_completion(chat, "m"),
            Err(LLMError::MalformedResponse(_))
        ));

        let chat: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": null}}]})).unwrap();
        assert!(matches!(
            into_completion(chat, "m"),
            Err(LLMError::EmptyCompletion(m)) if m == "m"
        ));
    }
}
