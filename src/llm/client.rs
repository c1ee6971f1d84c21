//! LLM client abstraction and provider selection
//!
//! Two HTTP providers are supported:
//! - **Anthropic**: Messages API with `tool_use` / `tool_result` blocks
//! - **Ollama**: local `/api/chat` with function-style tool calls

use crate::llm::messages::ConversationMessage;
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Generic LLM client trait for provider abstraction
///
/// The orchestrator, the digest builder and the judge only ever see this trait,
/// so tests can drive them with a scripted client.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Single-prompt completion without tools
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Send the full transcript plus the callable tool signatures
    async fn chat(
        &self,
        messages: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Response from an LLM generation request
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "length")
    pub finish_reason: String,
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    /// Plain text answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: "stop".to_string(),
            ..Default::default()
        }
    }

    /// Answer requesting tool calls, optionally with accompanying text.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: 4096,
        }
    }
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// Anthropic Messages API
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Anthropic {
    ///     api_key: std::env::var("ANTHROPIC_API_KEY")?,
    ///     api_base: "https://api.anthropic.com".to_string(),
    ///     model: "claude-sonnet-4-20250514".to_string(),
    ///     params: ModelParams::default(),
    /// };
    /// ```
    Anthropic {
        api_key: String,
        api_base: String,
        model: String,
        params: ModelParams,
    },

    /// Ollama local LLM provider
    ///
    /// Tool calling needs a model that supports it (e.g. `llama3.1`, `qwen2.5`).
    Ollama {
        base_url: String,
        model: String,
        params: ModelParams,
    },
}

impl Provider {
    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's feature is disabled or the HTTP
    /// client cannot be built.
    pub async fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "anthropic")]
            Provider::Anthropic {
                api_key,
                api_base,
                model,
                params,
            } => Ok(Arc::new(super::anthropic::AnthropicClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
                *params,
            )?)),

            #[cfg(feature = "ollama")]
            Provider::Ollama {
                base_url,
                model,
                params,
            } => Ok(Arc::new(super::ollama::OllamaClient::new(
                base_url.clone(),
                model.clone(),
                *params,
            )?)),

            #[allow(unreachable_patterns)]
            other => Err(AppError::Config(format!(
                "{} support is not compiled in; enable the `{}` feature",
                other.name(),
                other.name().to_lowercase()
            ))),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Anthropic { .. } => "Anthropic",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::Anthropic { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }

    /// Same provider with a different model (used for the judge).
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        let mut provider = self.clone();
        match &mut provider {
            Provider::Anthropic { model: m, .. } | Provider::Ollama { model: m, .. } => {
                *m = model.into()
            }
        }
        provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama() -> Provider {
        Provider::Ollama {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            params: ModelParams::default(),
        }
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(ollama().name(), "Ollama");
        let anthropic = Provider::Anthropic {
            api_key: "k".to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            model: "claude".to_string(),
            params: ModelParams::default(),
        };
        assert_eq!(anthropic.name(), "Anthropic");
    }

    #[test]
    fn test_with_model_keeps_provider() {
        let judge = ollama().with_model("qwen2.5");
        assert_eq!(judge.name(), "Ollama");
        assert_eq!(judge.model(), "qwen2.5");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_response_helpers() {
        assert!(!LLMResponse::text("done").has_tool_calls());
        let response = LLMResponse::with_tool_calls(
            "",
            vec![ToolCall {
                id: "1".into(),
                name: "web_search".into(),
                arguments: serde_json::json!({"query": "x"}),
            }],
        );
        assert!(response.has_tool_calls());
        assert_eq!(response.finish_reason, "tool_calls");
    }

    #[cfg(feature = "ollama")]
    #[tokio::test]
    async fn test_create_client_uses_configured_model() {
        let client = ollama().create_client().await.unwrap();
        assert_eq!(client.model_name(), "llama3.1");
    }
}
