//! Anthropic Claude LLM client implementation
//!
//! Talks to the Messages API directly over `reqwest`.
//!
//! # Features
//!
//! Enable with the `anthropic` feature flag (on by default).
//!
//! # Example
//!
//! ```rust,ignore
//! use delve::llm::{AnthropicClient, LLMClient, ModelParams};
//!
//! let client = AnthropicClient::new(
//!     api_key,
//!     "https://api.anthropic.com".to_string(),
//!     "claude-sonnet-4-20250514".to_string(),
//!     ModelParams::default(),
//! )?;
//! let response = client.generate("Hello!").await?;
//! ```

use crate::llm::client::{LLMClient, LLMResponse, ModelParams, TokenUsage};
use crate::llm::messages::{ConversationMessage, MessageRole};
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude client for API-based inference
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    params: ModelParams,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `api_base` - API root, without the `/v1` suffix
    /// * `model` - Model identifier
    /// * `params` - Sampling parameters
    pub fn new(api_key: String, api_base: String, model: String, params: ModelParams) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| AppError::LLM(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            params,
        })
    }

    /// Convert a ToolDefinition to the Messages API tool shape
    fn convert_tool(tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }

    /// Split the transcript into a system prompt and API messages.
    ///
    /// Assistant tool calls become `tool_use` blocks; consecutive tool results
    /// are merged into a single user turn of `tool_result` blocks.
    fn convert_messages(messages: &[ConversationMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut out: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        for message in messages {
            if message.role != MessageRole::Tool && !pending_results.is_empty() {
                out.push(json!({"role": "user", "content": std::mem::take(&mut pending_results)}));
            }

            match message.role {
                MessageRole::System => system_parts.push(&message.content),
                MessageRole::User => {
                    out.push(json!({"role": "user", "content": message.content}));
                }
                MessageRole::Assistant => {
                    let mut blocks = Vec::new();
                    if !message.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": message.content}));
                    }
                    for call in &message.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    if blocks.is_empty() {
                        blocks.push(json!({"type": "text", "text": ""}));
                    }
                    out.push(json!({"role": "assistant", "content": blocks}));
                }
                MessageRole::Tool => {
                    pending_results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                        "content": message.content,
                        "is_error": message.is_error,
                    }));
                }
            }
        }

        if !pending_results.is_empty() {
            out.push(json!({"role": "user", "content": pending_results}));
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, out)
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse> {
        let url = format!("{}/v1/messages", self.api_base);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("Anthropic API error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LLM(format!(
                "Anthropic API error: HTTP {}: {}",
                status, body
            )));
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse Anthropic response: {}", e)))
    }

    fn into_llm_response(response: MessagesResponse) -> LLMResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        LLMResponse {
            content,
            tool_calls,
            finish_reason: response.stop_reason.unwrap_or_else(|| "stop".to_string()),
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        }
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .chat(&[ConversationMessage::user(prompt)], &[])
            .await?;
        Ok(response.content)
    }

    async fn chat(
        &self,
        messages: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let (system, api_messages) = Self::convert_messages(messages);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.params.max_tokens,
            messages: api_messages,
            system,
            tools: tools.iter().map(Self::convert_tool).collect(),
            temperature: self.params.temperature,
        };

        let response = self.send(&request).await?;
        Ok(Self::into_llm_response(response))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_merges_tool_results() {
        let call = |id: &str| ToolCall {
            id: id.to_string(),
            name: "fetch_page".to_string(),
            arguments: json!({"url": "https://example.com"}),
        };
        let messages = vec![
            ConversationMessage::system("be brief"),
            ConversationMessage::user("Expand this URL"),
            ConversationMessage::assistant("", vec![call("a"), call("b")]),
            ConversationMessage::tool_result("a", "page text", false),
            ConversationMessage::tool_result("b", "Error fetching URL: 404", true),
            ConversationMessage::assistant("done", vec![]),
        ];

        let (system, converted) = AnthropicClient::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[1]["content"].as_array().unwrap().len(), 2);
        let results = converted[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "a");
        assert_eq!(results[1]["is_error"], true);
        assert_eq!(converted[3]["role"], "assistant");
    }

    #[test]
    fn test_response_parsing() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "web_search", "input": {"query": "rust"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let parsed: MessagesResponse = serde_json::from_value(raw).unwrap();
        let response = AnthropicClient::into_llm_response(parsed);
        assert_eq!(response.content, "Let me look.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "web_search");
        assert_eq!(response.finish_reason, "tool_use");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }
}
