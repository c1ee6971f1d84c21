//! Topic-indexed archive of expansions
//!
//! # Layout
//!
//! ```text
//! archive/
//!   agent-design/20240101_000000.json
//!   evals/20240101_000000.json      <- same expansion, second topic
//!   uncategorized/20240102_101500.json
//! ```
//!
//! An expansion is written once per topic. Every copy is produced by the same
//! `archive` call from the same value, so copies never diverge.

/// Pending-output store (`expanded/`).
pub mod expanded;
/// Line-delimited seed queue (`inbox.jsonl`).
pub mod inbox;

pub use expanded::ExpandedStore;
pub use inbox::Inbox;

use crate::types::{is_valid_item_id, AppError, Expansion, Result, DEFAULT_TOPIC};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const SUMMARY_EXCERPT_CHARS: usize = 300;
const CONTEXT_KEY_POINTS: usize = 3;

/// Filesystem-safe, lowercase, separator-normalized topic name.
pub fn sanitize_topic(topic: &str) -> String {
    let mut out = String::with_capacity(topic.len());
    for c in topic.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_whitespace() || c == '/' || c == '\\' {
            '-'
        } else if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
            c
        } else {
            continue;
        };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write via a temp file and rename so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Outcome of `archive_and_cleanup`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub archived: usize,
    pub paths: Vec<PathBuf>,
    pub expanded_removed: usize,
    pub inbox_removed: usize,
}

pub struct ArchiveIndex {
    root: PathBuf,
}

impl ArchiveIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn topic_dir(&self, topic: &str) -> PathBuf {
        self.root.join(sanitize_topic(topic))
    }

    /// File the expansion under each of its topics (`uncategorized` if none).
    /// Returns the written paths.
    pub fn archive(&self, expansion: &Expansion) -> Result<Vec<PathBuf>> {
        if !is_valid_item_id(&expansion.item_id) {
            return Err(AppError::InvalidInput(format!(
                "invalid seed id '{}'",
                expansion.item_id
            )));
        }
        let mut stored = expansion.clone();
        stored.topics = expansion.archive_topics();
        let body = serde_json::to_string_pretty(&stored)?;

        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for topic in &stored.topics {
            let dir = self.topic_dir(topic);
            if !seen.insert(dir.clone()) {
                continue;
            }
            let path = dir.join(format!("{}.json", stored.item_id));
            write_atomic(&path, &body)?;
            paths.push(path);
        }

        tracing::info!(item_id = %stored.item_id, topics = ?stored.topics, "archived expansion");
        Ok(paths)
    }

    /// All expansions filed under one topic; unreadable files are skipped.
    pub fn load_topic(&self, topic: &str) -> Result<Vec<Expansion>> {
        let dir = self.topic_dir(topic);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut expansions = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Expansion>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(expansion) => expansions.push(expansion),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable archive entry"),
            }
        }
        Ok(expansions)
    }

    /// Topic directory names, sorted.
    pub fn list_topics(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut topics: Vec<String> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        topics.sort();
        Ok(topics)
    }

    /// Expansions under any of `topics`, each `item_id` at most once, minus `exclude_ids`.
    pub fn find_related(&self, topics: &[String], exclude_ids: &HashSet<String>) -> Result<Vec<Expansion>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut related = Vec::new();

        for topic in topics {
            for expansion in self.load_topic(topic)? {
                if exclude_ids.contains(&expansion.item_id) {
                    continue;
                }
                if seen.insert(expansion.item_id.clone()) {
                    related.push(expansion);
                }
            }
        }
        Ok(related)
    }

    /// Archive each expansion, then drop its pending output and its inbox record.
    pub fn archive_and_cleanup(
        &self,
        expansions: &[Expansion],
        expanded: &ExpandedStore,
        inbox: &Inbox,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut archived_ids = HashSet::new();

        for expansion in expansions {
            report.paths.extend(self.archive(expansion)?);
            report.archived += 1;
            archived_ids.insert(expansion.item_id.clone());
            if expanded.remove(&expansion.item_id)? {
                report.expanded_removed += 1;
            }
        }

        report.inbox_removed = inbox.remove_ids(&archived_ids)?;
        Ok(report)
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Compact digest of the `max_items` most recent expansions for a prompt.
/// Empty input yields an empty string.
pub fn context_summary(expansions: &[Expansion], max_items: usize) -> String {
    if expansions.is_empty() || max_items == 0 {
        return String::new();
    }

    let mut recent: Vec<&Expansion> = expansions.iter().collect();
    recent.sort_by(|a, b| b.expanded_at.cmp(&a.expanded_at));
    recent.truncate(max_items);

    let mut lines = vec!["## Related prior research".to_string(), String::new()];
    for exp in recent {
        lines.push(format!(
            "### {}",
            exp.source_url.as_deref().unwrap_or(&exp.item_id)
        ));
        lines.push(format!("**Topics:** {}", exp.topics.join(", ")));
        lines.push(format!(
            "**Summary:** {}",
            excerpt(&exp.source_summary, SUMMARY_EXCERPT_CHARS)
        ));
        let points: Vec<&str> = exp
            .key_points
            .iter()
            .take(CONTEXT_KEY_POINTS)
            .map(String::as_str)
            .collect();
        lines.push(format!("**Key points:** {}", points.join("; ")));
        lines.push(String::new());
    }
    lines.join("\n")
}
