//! Mock implementations for testing.
//!
//! This module provides a scripted LLM client and a handful of mock tools
//! that can be used across different test files without duplication.

use async_trait::async_trait;
use delve::llm::{ConversationMessage, LLMClient, LLMResponse};
use delve::tools::{Tool, ToolError};
use delve::types::{AppError, Result, ToolCall, ToolDefinition};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

/// LLM client that replays canned chat responses in order.
///
/// Every transcript it is shown is kept, so tests can inspect the prompt and
/// the tool results the orchestrator sent. Once the script runs out, `chat`
/// fails like a provider outage would.
pub struct ScriptedLLMClient {
    responses: Mutex<VecDeque<LLMResponse>>,
    generate_reply: Option<String>,
    seen: Mutex<Vec<Vec<ConversationMessage>>>,
}

impl ScriptedLLMClient {
    pub fn new(responses: Vec<LLMResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            generate_reply: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Client whose `generate` always answers with `reply`.
    pub fn generating(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            generate_reply: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn chat_calls(&self) -> usize {
        self.seen.lock().len()
    }

    /// Transcript passed to the n-th chat call.
    pub fn transcript(&self, call: usize) -> Vec<ConversationMessage> {
        self.seen.lock()[call].clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.generate_reply
            .clone()
            .ok_or_else(|| AppError::LLM("no generate reply scripted".to_string()))
    }

    async fn chat(
        &self,
        messages: &[ConversationMessage],
        _tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.seen.lock().push(messages.to_vec());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| AppError::LLM("script exhausted".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Tool returning a fixed string and counting its calls.
pub struct StaticTool {
    name: String,
    reply: String,
    pub calls: AtomicUsize,
}

impl StaticTool {
    pub fn new(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "static reply"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value) -> std::result::Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Tool that always fails with a network error.
pub struct FailingTool(pub &'static str);

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        self.0
    }
    fn description(&self) -> &str {
        "always fails"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value) -> std::result::Result<String, ToolError> {
        Err(ToolError::Network("connection refused".to_string()))
    }
}

/// Tool whose calls only complete once `parties` of them are in flight at
/// the same time. Sequential execution deadlocks on it.
pub struct BarrierTool {
    barrier: Barrier,
}

impl BarrierTool {
    pub fn new(parties: usize) -> Arc<Self> {
        Arc::new(Self {
            barrier: Barrier::new(parties),
        })
    }
}

#[async_trait]
impl Tool for BarrierTool {
    fn name(&self) -> &str {
        "fetch_page"
    }
    fn description(&self) -> &str {
        "waits for its siblings"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {"url": {"type": "string"}}})
    }
    async fn execute(&self, args: Value) -> std::result::Result<String, ToolError> {
        self.barrier.wait().await;
        Ok(format!("page {}", args["url"].as_str().unwrap_or_default()))
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// Final answer carrying a findings block with the given topics.
pub fn findings_reply(summary: &str, topics: &[&str]) -> LLMResponse {
    let body = json!({
        "source_summary": summary,
        "key_points": ["point one", "point two"],
        "related": [{
            "url": "https://related.example.com",
            "title": "Related",
            "relevance": "same problem",
            "source": "web search"
        }],
        "assessment": "worth reading",
        "topics": topics,
    });
    LLMResponse::text(format!("Done.\n\n```json\n{}\n```", body))
}
