//! Concurrent execution of the tool calls requested in one turn.

use crate::llm::messages::ConversationMessage;
use crate::tools::registry::ToolRegistry;
use crate::types::ToolCall;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Record of a single tool call execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// Unique identifier for this tool call (from the LLM).
    pub id: String,
    /// Name of the tool that was called.
    pub name: String,
    /// Arguments passed to the tool.
    pub arguments: serde_json::Value,
    /// Text handed back to the model, error text included.
    pub result: String,
    pub success: bool,
    /// Time taken to execute the tool in milliseconds.
    pub duration_ms: u64,
    /// Error message if the tool failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Turn in which the call was requested.
    #[serde(default)]
    pub turn: usize,
}

impl ToolCallRecord {
    /// Transcript message carrying this call's result.
    pub fn to_message(&self) -> ConversationMessage {
        ConversationMessage::tool_result(&self.id, &self.result, !self.success)
    }
}

/// Runs every call of a turn at once and joins them in request order.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute all calls concurrently. The output has one record per call, in
    /// the order the calls were requested; failures become error text.
    pub async fn dispatch(&self, calls: &[ToolCall], turn: usize) -> Vec<ToolCallRecord> {
        tracing::debug!(turn, count = calls.len(), "dispatching tool batch");
        let futures = calls.iter().map(|call| self.execute_single(call, turn));
        join_all(futures).await
    }

    async fn execute_single(&self, call: &ToolCall, turn: usize) -> ToolCallRecord {
        let start = Instant::now();

        let outcome = match self.registry.get(&call.name) {
            Some(tool) => tool
                .execute(call.arguments.clone())
                .await
                .map_err(|e| format!("{}: {}", tool.error_context(), e)),
            None => Err(format!("Unknown tool: {}", call.name)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => ToolCallRecord {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
                result,
                success: true,
                duration_ms,
                error: None,
                turn,
            },
            Err(text) => {
                tracing::warn!(tool = %call.name, error = %text, "tool call failed");
                ToolCallRecord {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: text.clone(),
                    success: false,
                    duration_ms,
                    error: Some(text),
                    turn,
                }
            }
        }
    }
}
