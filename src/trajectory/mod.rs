//! Append-only event log of one batch run
//!
//! The recorder is shared by reference between the batch runner and the
//! orchestrator, so appends go through an interior mutex. A saved log lands at
//! `<trajectories>/<run_id>.json`.

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::types::{AppError, Result};

const RESULT_PREVIEW_CHARS: usize = 500;
const SUMMARY_EXCERPT_CHARS: usize = 300;

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// What happened, tagged by `type` in the saved JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ItemStart {
        item_id: String,
        content: String,
        note: Option<String>,
    },
    ToolCall {
        item_id: String,
        tool_name: String,
        tool_input: Value,
        turn: usize,
    },
    ToolResult {
        item_id: String,
        tool_name: String,
        result_preview: String,
        turn: usize,
    },
    Thinking {
        item_id: String,
        thinking: String,
        turn: usize,
    },
    ItemComplete {
        item_id: String,
        expansion_summary: String,
        topics: Vec<String>,
        related_count: usize,
        turns_used: usize,
    },
    Error {
        item_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrajectorySummary {
    pub total_events: usize,
    pub items_processed: usize,
    pub errors: usize,
    pub tool_calls: usize,
}

impl TrajectorySummary {
    pub fn from_events(events: &[TrajectoryEvent]) -> Self {
        let count = |pred: fn(&EventKind) -> bool| events.iter().filter(|e| pred(&e.kind)).count();
        Self {
            total_events: events.len(),
            items_processed: count(|k| matches!(k, EventKind::ItemComplete { .. })),
            errors: count(|k| matches!(k, EventKind::Error { .. })),
            tool_calls: count(|k| matches!(k, EventKind::ToolCall { .. })),
        }
    }
}

/// A saved trajectory file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryLog {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub events: Vec<TrajectoryEvent>,
    pub summary: TrajectorySummary,
}

pub struct TrajectoryRecorder {
    run_id: String,
    start_time: DateTime<Utc>,
    events: Mutex<Vec<TrajectoryEvent>>,
}

impl Default for TrajectoryRecorder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TrajectoryRecorder {
    /// Start a recorder; the run id defaults to the local start time.
    pub fn new(run_id: Option<String>) -> Self {
        Self {
            run_id: run_id.unwrap_or_else(|| Local::now().format("%Y%m%d_%H%M%S").to_string()),
            start_time: Utc::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn push(&self, kind: EventKind) {
        self.events.lock().push(TrajectoryEvent {
            timestamp: Utc::now(),
            kind,
        });
    }

    pub fn item_start(&self, item_id: &str, content: &str, note: Option<&str>) {
        self.push(EventKind::ItemStart {
            item_id: item_id.to_string(),
            content: content.to_string(),
            note: note.map(String::from),
        });
    }

    pub fn tool_call(&self, item_id: &str, tool_name: &str, tool_input: &Value, turn: usize) {
        self.push(EventKind::ToolCall {
            item_id: item_id.to_string(),
            tool_name: tool_name.to_string(),
            tool_input: tool_input.clone(),
            turn,
        });
    }

    pub fn tool_result(&self, item_id: &str, tool_name: &str, result: &str, turn: usize) {
        self.push(EventKind::ToolResult {
            item_id: item_id.to_string(),
            tool_name: tool_name.to_string(),
            result_preview: excerpt(result, RESULT_PREVIEW_CHARS),
            turn,
        });
    }

    pub fn thinking(&self, item_id: &str, thinking: &str, turn: usize) {
        self.push(EventKind::Thinking {
            item_id: item_id.to_string(),
            thinking: thinking.to_string(),
            turn,
        });
    }

    pub fn item_complete(
        &self,
        item_id: &str,
        summary: &str,
        topics: &[String],
        related_count: usize,
        turns_used: usize,
    ) {
        self.push(EventKind::ItemComplete {
            item_id: item_id.to_string(),
            expansion_summary: excerpt(summary, SUMMARY_EXCERPT_CHARS),
            topics: topics.to_vec(),
            related_count,
            turns_used,
        });
    }

    pub fn error(&self, item_id: &str, error: &str) {
        self.push(EventKind::Error {
            item_id: item_id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn events(&self) -> Vec<TrajectoryEvent> {
        self.events.lock().clone()
    }

    /// Snapshot the log with the end time set to now.
    pub fn snapshot(&self) -> TrajectoryLog {
        let events = self.events();
        TrajectoryLog {
            run_id: self.run_id.clone(),
            start_time: self.start_time,
            end_time: Utc::now(),
            summary: TrajectorySummary::from_events(&events),
            events,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        std::fs::write(&path, serde_json::to_string_pretty(&self.snapshot())?)?;
        tracing::info!(path = %path.display(), "trajectory saved");
        Ok(path)
    }
}

pub fn load_trajectory(dir: &Path, run_id: &str) -> Result<TrajectoryLog> {
    let path = dir.join(format!("{}.json", run_id));
    if !path.exists() {
        return Err(AppError::NotFound(format!("Trajectory {} not found", run_id)));
    }
    let raw = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Run ids of all saved trajectories, sorted.
pub fn list_trajectories(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    ids.sort();
    Ok(ids)
}
