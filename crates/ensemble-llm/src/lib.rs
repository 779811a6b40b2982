//! LLM provider abstraction for the stock ensemble
//!
//! This crate provides the pieces the ensemble needs to talk to hosted
//! chat-completion endpoints:
//!
//! - Message and completion request/response types
//! - The [`LLMProvider`] trait and an OpenAI-compatible implementation
//! - [`ModelClient`], a provider bound to one model id and temperature

pub mod client;
pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod providers;

// Re-export main types
pub use client::{LlmModelClient, ModelClient, ModelSpec};
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;
