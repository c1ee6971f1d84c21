//! # delve
//!
//! A turn-budgeted research agent that expands seeds (URLs, ideas, questions)
//! into structured findings, files them into a topic archive, and scores them
//! with an evaluation harness.
//!
//! ## Overview
//!
//! delve can be used in two ways:
//!
//! 1. **As a CLI** - `delve add`, `delve run`, `delve digest`, `delve eval`, ...
//! 2. **As a library** - drive the [`Orchestrator`] with your own [`LLMClient`]
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use delve::{Orchestrator, OrchestratorConfig, PromptContext, ToolDispatcher, ToolRegistry};
//! use delve::tools::{ToolContext, ToolSettings};
//! use delve::types::InboxItem;
//! use std::sync::Arc;
//!
//! let client = provider.create_client().await?;
//! let ctx = ToolContext::new(ToolSettings::default(), None)?;
//! let registry = Arc::new(ToolRegistry::research_tools(ctx));
//! let orchestrator = Orchestrator::new(
//!     client,
//!     ToolDispatcher::new(registry),
//!     OrchestratorConfig { max_turns: 10 },
//! );
//!
//! let item = InboxItem::from_content(InboxItem::new_id(), "https://example.com/post");
//! let outcome = orchestrator.run(&item, &PromptContext::default(), None).await;
//! println!("{} after {} turns", outcome.final_state, outcome.turn_count);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `anthropic` | Anthropic Messages API client (default) |
//! | `ollama` | Ollama local inference (default) |
//!
//! ## Layout on disk
//!
//! All paths come from `delve.toml` (see [`DelveConfig`]):
//!
//! - `inbox.jsonl` - pending seeds, one JSON object per line
//! - `expanded/` - one expansion per seed, waiting for the digest
//! - `archive/<topic>/` - expansions filed by topic after a digest
//! - `trajectories/` - one event log per batch run
//! - `digests/` - rendered markdown digests

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Research agent: prompt, orchestrator state machine and output extraction.
pub mod agents;
/// Inbox, pending expansions and the topic archive.
pub mod archive;
/// Command-line interface.
pub mod cli;
/// Daily digest synthesis.
pub mod digest;
/// Evaluation harness and reliability testing.
pub mod eval;
/// LLM provider clients and abstractions.
pub mod llm;
/// Sequential batch processing of the inbox.
pub mod research;
/// Research tools and the concurrent dispatcher.
pub mod tools;
/// Append-only event logs of batch runs.
pub mod trajectory;
/// Core types (seeds, expansions, errors).
pub mod types;
/// Configuration (TOML).
pub mod utils;

// Re-export commonly used types
pub use agents::{AgentState, Orchestrator, OrchestratorConfig, PromptContext, RunOutcome};
pub use archive::{ArchiveIndex, ExpandedStore, Inbox};
pub use eval::{EvalHarness, EvalInput, EvalReport, EvalResult, ReliabilityReport};
pub use llm::{LLMClient, LLMResponse, Provider};
pub use research::ResearchRunner;
pub use tools::{ToolDispatcher, ToolRegistry};
pub use trajectory::TrajectoryRecorder;
pub use types::{AppError, Expansion, InboxItem, Result};
pub use utils::toml_config::DelveConfig;
