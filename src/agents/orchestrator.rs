//! Turn-budgeted tool-calling loop
//!
//! One run expands one seed. The loop is an explicit state machine:
//!
//! ```text
//! Running ──tool calls, budget left──▶ AwaitingTools ──results appended──▶ Running
//!    │
//!    ├── no tool calls ─────────────────▶ Done
//!    ├── tool calls, budget spent ──────▶ Truncated
//!    └── model error ───────────────────▶ Aborted
//! ```
//!
//! Only `Running` calls the model, and it is only entered while
//! `turn_count < max_turns`, so a run never exceeds its budget.

use crate::agents::extractor::{extract, Extraction};
use crate::agents::prompt::{build_user_prompt, system_prompt, PromptContext};
use crate::llm::client::{LLMClient, TokenUsage};
use crate::llm::messages::{ConversationMessage, Transcript};
use crate::tools::dispatcher::{ToolCallRecord, ToolDispatcher};
use crate::trajectory::TrajectoryRecorder;
use crate::types::{Expansion, InboxItem, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Default turn budget.
pub const DEFAULT_MAX_TURNS: usize = 10;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard cap on model invocations per run.
    pub max_turns: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Running,
    AwaitingTools,
    Done,
    Truncated,
    Aborted,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Done | AgentState::Truncated | AgentState::Aborted)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Running => write!(f, "running"),
            AgentState::AwaitingTools => write!(f, "awaiting_tools"),
            AgentState::Done => write!(f, "done"),
            AgentState::Truncated => write!(f, "truncated"),
            AgentState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Everything a run produced, for archiving and for scoring.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub expansion: Expansion,
    /// Findings block exactly as the model wrote it, if one was recovered.
    pub raw_output: Option<Value>,
    pub transcript: Transcript,
    /// Every dispatched call, in dispatch order.
    pub tool_calls: Vec<ToolCallRecord>,
    pub turn_count: usize,
    pub final_state: AgentState,
    /// Model-client failure that aborted the run.
    pub error: Option<String>,
    pub usage: TokenUsage,
}

pub struct Orchestrator {
    client: Arc<dyn LLMClient>,
    dispatcher: ToolDispatcher,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LLMClient>, dispatcher: ToolDispatcher, config: OrchestratorConfig) -> Self {
        Self {
            client,
            dispatcher,
            config: OrchestratorConfig {
                max_turns: config.max_turns.max(1),
            },
        }
    }

    pub fn max_turns(&self) -> usize {
        self.config.max_turns
    }

    /// Expand one seed. Never fails: model errors end the run in `Aborted`
    /// with the incomplete fallback expansion.
    pub async fn run(
        &self,
        item: &InboxItem,
        ctx: &PromptContext,
        recorder: Option<&TrajectoryRecorder>,
    ) -> RunOutcome {
        let tools = self.dispatcher.registry().get_tool_definitions();
        let max_turns = self.config.max_turns;

        let mut transcript = Transcript::new();
        transcript.push(ConversationMessage::system(system_prompt(max_turns)));
        transcript.push(ConversationMessage::user(build_user_prompt(item, ctx)));

        let mut state = AgentState::Running;
        let mut turn_count = 0usize;
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut error = None;

        while !state.is_terminal() {
            state = match state {
                AgentState::Running => {
                    tracing::debug!(item_id = %item.id, turn = turn_count + 1, "calling model");
                    match self.client.chat(transcript.messages(), &tools).await {
                        Err(e) => {
                            tracing::error!(item_id = %item.id, error = %e, "model call failed; aborting run");
                            error = Some(e.to_string());
                            AgentState::Aborted
                        }
                        Ok(response) => {
                            turn_count += 1;
                            if let Some(u) = response.usage {
                                usage = TokenUsage::new(
                                    usage.prompt_tokens + u.prompt_tokens,
                                    usage.completion_tokens + u.completion_tokens,
                                );
                            }
                            transcript.push(ConversationMessage::assistant(
                                &response.content,
                                response.tool_calls.clone(),
                            ));

                            if response.tool_calls.is_empty() {
                                AgentState::Done
                            } else {
                                if let Some(rec) = recorder {
                                    if !response.content.trim().is_empty() {
                                        rec.thinking(&item.id, &response.content, turn_count);
                                    }
                                }
                                if turn_count >= max_turns {
                                    tracing::warn!(
                                        item_id = %item.id,
                                        turns = turn_count,
                                        "turn budget spent with tool calls pending"
                                    );
                                    AgentState::Truncated
                                } else {
                                    pending = response.tool_calls;
                                    AgentState::AwaitingTools
                                }
                            }
                        }
                    }
                }
                AgentState::AwaitingTools => {
                    if let Some(rec) = recorder {
                        for call in &pending {
                            rec.tool_call(&item.id, &call.name, &call.arguments, turn_count);
                        }
                    }

                    let batch = self.dispatcher.dispatch(&pending, turn_count).await;
                    transcript.extend(batch.iter().map(ToolCallRecord::to_message));

                    if let Some(rec) = recorder {
                        for record in &batch {
                            rec.tool_result(&item.id, &record.name, &record.result, turn_count);
                        }
                    }
                    records.extend(batch);
                    pending.clear();
                    AgentState::Running
                }
                terminal => terminal,
            };
        }

        let Extraction {
            expansion,
            raw_output,
        } = match state {
            AgentState::Aborted => Extraction {
                expansion: Expansion::incomplete(item),
                raw_output: None,
            },
            _ => extract(&transcript, item),
        };

        tracing::info!(
            item_id = %item.id,
            state = %state,
            turns = turn_count,
            tool_calls = records.len(),
            "run finished"
        );

        RunOutcome {
            expansion,
            raw_output,
            transcript,
            tool_calls: records,
            turn_count,
            final_state: state,
            error,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::LLMResponse;
    use crate::tools::registry::{Tool, ToolRegistry};
    use crate::tools::ToolError;
    use crate::types::{AppError, Result, ToolDefinition};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;

    /// Replays canned responses; errors once the script runs out.
    struct Scripted {
        responses: Mutex<VecDeque<LLMResponse>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(responses: Vec<LLMResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMClient for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn chat(&self, _m: &[ConversationMessage], _t: &[ToolDefinition]) -> Result<LLMResponse> {
            *self.calls.lock() += 1;
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| AppError::LLM("script exhausted".into()))
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "fetch_page"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Value) -> std::result::Result<String, ToolError> {
            Ok(format!("content of {}", args["url"]))
        }
    }

    fn fetch(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "fetch_page".into(),
            arguments: json!({"url": "https://example.com"}),
        }
    }

    fn orchestrator(client: Arc<Scripted>, max_turns: usize) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        Orchestrator::new(
            client,
            ToolDispatcher::new(Arc::new(registry)),
            OrchestratorConfig { max_turns },
        )
    }

    fn item() -> InboxItem {
        InboxItem::from_content("20240101_000000", "https://example.com/post")
    }

    #[tokio::test]
    async fn test_done_after_tools() {
        let client = Scripted::new(vec![
            LLMResponse::with_tool_calls("", vec![fetch("a"), fetch("b")]),
            LLMResponse::text("```json\n{\"source_summary\": \"s\", \"key_points\": [], \"assessment\": \"a\"}\n```"),
        ]);
        let outcome = orchestrator(client.clone(), 10)
            .run(&item(), &PromptContext::default(), None)
            .await;

        assert_eq!(outcome.final_state, AgentState::Done);
        assert_eq!(outcome.turn_count, 2);
        assert_eq!(outcome.tool_calls.len(), 2);
        assert_eq!(outcome.expansion.source_summary, "s");
        // system, user, assistant, 2 tool results, assistant
        assert_eq!(outcome.transcript.len(), 6);
        assert_eq!(*client.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_truncates_at_budget() {
        let client = Scripted::new(
            (0..5)
                .map(|i| LLMResponse::with_tool_calls("", vec![fetch(&i.to_string())]))
                .collect(),
        );
        let recorder = TrajectoryRecorder::new(Some("t".into()));
        let outcome = orchestrator(client.clone(), 3)
            .run(&item(), &PromptContext::default(), Some(&recorder))
            .await;

        assert_eq!(outcome.final_state, AgentState::Truncated);
        assert_eq!(outcome.turn_count, 3);
        assert_eq!(*client.calls.lock(), 3);
        assert_eq!(outcome.tool_calls.len(), 2);
        assert!(outcome.expansion.is_incomplete());
        assert_eq!(recorder.snapshot().summary.tool_calls, 2);
    }

    #[tokio::test]
    async fn test_model_error_aborts_with_fallback() {
        let client = Scripted::new(vec![LLMResponse::with_tool_calls("thinking", vec![fetch("a")])]);
        let outcome = orchestrator(client, 10)
            .run(&item(), &PromptContext::default(), None)
            .await;

        assert_eq!(outcome.final_state, AgentState::Aborted);
        assert_eq!(outcome.turn_count, 1);
        assert!(outcome.error.unwrap().contains("script exhausted"));
        assert!(outcome.expansion.is_incomplete());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AgentState::Running.is_terminal());
        assert!(!AgentState::AwaitingTools.is_terminal());
        assert!(AgentState::Truncated.is_terminal());
        assert_eq!(AgentState::AwaitingTools.to_string(), "awaiting_tools");
    }
}
