//! Ollama client over the `/api/chat` endpoint (non-streaming).

use crate::llm::client::{LLMClient, LLMResponse, ModelParams, TokenUsage};
use crate::llm::messages::{ConversationMessage, MessageRole};
use crate::types::{AppError, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    params: ModelParams,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, params: ModelParams) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| AppError::LLM(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            params,
        })
    }

    fn convert_messages(messages: &[ConversationMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::System => json!({"role": "system", "content": msg.content}),
                MessageRole::User => json!({"role": "user", "content": msg.content}),
                MessageRole::Assistant if msg.tool_calls.is_empty() => {
                    json!({"role": "assistant", "content": msg.content})
                }
                MessageRole::Assistant => {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments
                                }
                            })
                        })
                        .collect();
                    json!({
                        "role": "assistant",
                        "content": msg.content,
                        "tool_calls": tool_calls
                    })
                }
                MessageRole::Tool => json!({"role": "tool", "content": msg.content}),
            })
            .collect()
    }

    fn convert_tool(tool: &ToolDefinition) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters
            }
        })
    }

    /// Parse Ollama response JSON
    fn parse_response(json: &Value) -> Result<LLMResponse> {
        let message = json
            .get("message")
            .ok_or_else(|| AppError::LLM("No message in Ollama response".into()))?;

        let content = message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(tc_array) = message.get("tool_calls").and_then(|v| v.as_array()) {
            for tc in tc_array {
                if let Some(func) = tc.get("function") {
                    let name = func
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    let arguments = func.get("arguments").cloned().unwrap_or(json!({}));

                    tool_calls.push(ToolCall {
                        id: uuid::Uuid::new_v4().to_string(),
                        name,
                        arguments,
                    });
                }
            }
        }

        let finish_reason = if !tool_calls.is_empty() {
            "tool_calls".to_string()
        } else {
            json.get("done_reason")
                .and_then(|v| v.as_str())
                .unwrap_or("stop")
                .to_string()
        };

        let usage = match (
            json.get("prompt_eval_count").and_then(|v| v.as_u64()),
            json.get("eval_count").and_then(|v| v.as_u64()),
        ) {
            (Some(p), Some(c)) => Some(TokenUsage::new(p as u32, c as u32)),
            _ => None,
        };

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
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
        let mut options = json!({ "num_predict": self.params.max_tokens });
        if let Some(temperature) = self.params.temperature {
            options["temperature"] = json!(temperature);
        }

        let mut body = json!({
            "model": self.model,
            "messages": Self::convert_messages(messages),
            "stream": false,
            "options": options,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(Self::convert_tool).collect());
        }

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLM(format!(
                "Ollama request failed ({}): {}",
                status, text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse Ollama response: {}", e)))?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_calls() {
        let raw = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "web_search", "arguments": {"query": "turn budgets"}}}
                ]
            },
            "done_reason": "stop",
            "prompt_eval_count": 40,
            "eval_count": 8
        });
        let response = OllamaClient::parse_response(&raw).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "web_search");
        assert!(!response.tool_calls[0].id.is_empty());
        assert_eq!(response.finish_reason, "tool_calls");
        assert_eq!(response.usage.unwrap().total_tokens, 48);
    }

    #[test]
    fn test_parse_missing_message() {
        assert!(OllamaClient::parse_response(&json!({"done": true})).is_err());
    }

    #[test]
    fn test_convert_tool_result_message() {
        let converted = OllamaClient::convert_messages(&[ConversationMessage::tool_result(
            "id", "page text", false,
        )]);
        assert_eq!(converted[0], json!({"role": "tool", "content": "page text"}));
    }
}
