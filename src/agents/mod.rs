//! The research agent: prompt construction, the turn-budgeted loop and
//! extraction of structured findings.

/// Structured-output recovery from a transcript.
pub mod extractor;
/// Turn-budgeted tool-calling state machine.
pub mod orchestrator;
/// System and user prompts.
pub mod prompt;

pub use extractor::{extract, Extraction, StructuredFindings};
pub use orchestrator::{AgentState, Orchestrator, OrchestratorConfig, RunOutcome};
pub use prompt::PromptContext;
