//! LLM provider clients and abstractions
//!
//! - [`LLMClient`] - the trait every provider implements
//! - [`Provider`] - runtime provider selection
//! - [`Transcript`] / [`ConversationMessage`] - the message log a run owns
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `anthropic` - Anthropic Messages API
//! - `ollama` - Local Ollama server

/// Core LLM client trait and provider selection.
pub mod client;
/// Conversation messages and the append-only transcript.
pub mod messages;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "anthropic")]
pub mod anthropic;

pub use client::{LLMClient, LLMResponse, ModelParams, Provider, TokenUsage};
pub use messages::{ConversationMessage, MessageRole, Transcript};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicClient;
#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;
