//! Batch processing of the inbox
//!
//! Seeds are expanded one after another by a single [`runner::ResearchRunner`];
//! concurrency only happens inside a run, where tool calls of one turn are
//! dispatched together.
//!
//! # Workflow
//!
//! 1. **Load** the inbox and drop seeds that already have an expansion
//! 2. **Context** from the archive: known topics and related prior research
//! 3. **Expand** each seed through the orchestrator
//! 4. **Persist** the expansion to `expanded/` for the next digest
//! 5. **Record** the trajectory of the whole batch

/// Sequential seed processing.
pub mod runner;

pub use runner::{BatchSummary, ItemReport, ResearchRunner, RunnerPaths};
