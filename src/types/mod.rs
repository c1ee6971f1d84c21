use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summary prefix carried by every fallback expansion.
pub const INCOMPLETE_MARKER: &str = "Expansion incomplete";

/// Topic used when an expansion is archived without any topics.
pub const DEFAULT_TOPIC: &str = "uncategorized";

// ============= Seed Types =============

/// What kind of seed the user submitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Url,
    Idea,
    Question,
}

impl ItemKind {
    /// Classify free-form content: anything with an http(s) scheme is a URL.
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim_start();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ItemKind::Url
        } else {
            ItemKind::Idea
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Url => write!(f, "url"),
            ItemKind::Idea => write!(f, "idea"),
            ItemKind::Question => write!(f, "question"),
        }
    }
}

/// A seed waiting in the inbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboxItem {
    /// Time-derived identifier (`YYYYMMDD_HHMMSS`)
    pub id: String,
    /// URL or idea/question text
    pub content: String,
    #[serde(alias = "item_type")]
    pub kind: ItemKind,
    /// Why the user found this interesting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Locally stored content for gated sources
    #[serde(default, alias = "local_content", skip_serializing_if = "Option::is_none")]
    pub local_content_ref: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// Ids name files on disk, so only `[0-9A-Za-z_-]` is accepted.
pub fn is_valid_item_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl InboxItem {
    /// Generate a seed id from the local wall clock. Not unique on its own;
    /// see [`InboxItem::unique_id`].
    pub fn new_id() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// First of `base`, `base_1`, `base_2`, ... for which `taken` is false.
    pub fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Build a seed from user input, detecting whether it is a URL.
    pub fn from_content(id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: id.into(),
            kind: ItemKind::detect(&content),
            content,
            note: None,
            local_content_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style setter for the kind.
    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder-style setter for the note.
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// Builder-style setter for the local content reference.
    pub fn with_local_content(mut self, path: Option<PathBuf>) -> Self {
        self.local_content_ref = path;
        self
    }

    /// The source URL, when this seed is a URL.
    pub fn source_url(&self) -> Option<String> {
        match self.kind {
            ItemKind::Url => Some(self.content.clone()),
            _ => None,
        }
    }
}

// ============= Expansion Types =============

/// A related resource discovered during expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedItem {
    pub url: String,
    pub title: String,
    /// Why this is relevant to the source
    pub relevance: String,
    /// How it was found (e.g. "web search for X")
    pub source: String,
}

/// The structured research result for one seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expansion {
    pub item_id: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub source_summary: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub related: Vec<RelatedItem>,
    pub assessment: String,
    #[serde(default)]
    pub research_notes: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub expanded_at: DateTime<Utc>,
}

impl Expansion {
    /// Degraded result used whenever no structured output could be recovered.
    pub fn incomplete(item: &InboxItem) -> Self {
        Self {
            item_id: item.id.clone(),
            source_url: item.source_url(),
            source_summary: format!(
                "{} - agent did not produce structured output",
                INCOMPLETE_MARKER
            ),
            key_points: Vec::new(),
            related: Vec::new(),
            assessment: "Unable to complete expansion".to_string(),
            research_notes: None,
            topics: Vec::new(),
            expanded_at: Utc::now(),
        }
    }

    /// True for fallback expansions.
    pub fn is_incomplete(&self) -> bool {
        self.source_summary.starts_with(INCOMPLETE_MARKER)
    }

    /// Topics used for filing, defaulting to `uncategorized`.
    pub fn archive_topics(&self) -> Vec<String> {
        if self.topics.is_empty() {
            vec![DEFAULT_TOPIC.to_string()]
        } else {
            self.topics.clone()
        }
    }
}

// ============= Digest Types =============

/// Summary of one expansion for the digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestEntry {
    pub item_id: String,
    pub title: String,
    pub one_liner: String,
    pub key_finding: String,
    #[serde(default)]
    pub worth_following: Vec<String>,
}

/// Digest built from a set of expansions; regenerated on every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Digest {
    pub date: String,
    pub entries: Vec<DigestEntry>,
    #[serde(default)]
    pub cross_connections: Vec<String>,
    #[serde(default)]
    pub open_threads: Vec<String>,
}

// ============= Tool Types =============

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_detection() {
        assert_eq!(ItemKind::detect("https://example.com"), ItemKind::Url);
        assert_eq!(ItemKind::detect("http://example.com"), ItemKind::Url);
        assert_eq!(ItemKind::detect("what is a turn budget?"), ItemKind::Idea);
        assert_eq!(ItemKind::detect("ftp://example.com"), ItemKind::Idea);
    }

    #[test]
    fn test_inbox_item_accepts_legacy_field_names() {
        let line = r#"{"id":"20240101_000000","content":"https://example.com/post","item_type":"url","local_content":"fetch_cache/x.txt","created_at":"2024-01-01T00:00:00Z"}"#;
        let item: InboxItem = serde_json::from_str(line).unwrap();
        assert_eq!(item.kind, ItemKind::Url);
        assert_eq!(
            item.local_content_ref,
            Some(PathBuf::from("fetch_cache/x.txt"))
        );
        assert!(item.note.is_none());
    }

    #[test]
    fn test_new_id_format() {
        let id = InboxItem::new_id();
        assert_eq!(id.len(), 15);
        assert_eq!(&id[8..9], "_");
    }

    #[test]
    fn test_unique_id_suffixes_collisions() {
        let taken = ["20240101_000000", "20240101_000000_1"];
        let is_taken = |id: &str| taken.contains(&id);
        assert_eq!(InboxItem::unique_id("20240101_000000", is_taken), "20240101_000000_2");
        assert_eq!(InboxItem::unique_id("20240101_000001", is_taken), "20240101_000001");
    }

    #[test]
    fn test_item_id_validation() {
        assert!(is_valid_item_id("20240101_000000"));
        assert!(is_valid_item_id("20240101_000000_2"));
        assert!(is_valid_item_id("seed-a"));
        assert!(!is_valid_item_id(""));
        assert!(!is_valid_item_id("../x"));
        assert!(!is_valid_item_id("a/b"));
        assert!(!is_valid_item_id("a b"));
    }

    #[test]
    fn test_incomplete_expansion() {
        let item = InboxItem::from_content("20240101_000000", "https://example.com/post");
        let expansion = Expansion::incomplete(&item);
        assert!(expansion.is_incomplete());
        assert!(expansion.source_summary.starts_with(INCOMPLETE_MARKER));
        assert!(expansion.key_points.is_empty());
        assert!(expansion.topics.is_empty());
        assert_eq!(
            expansion.source_url.as_deref(),
            Some("https://example.com/post")
        );
    }

    #[test]
    fn test_archive_topics_default() {
        let item = InboxItem::from_content("1", "idea");
        let mut expansion = Expansion::incomplete(&item);
        assert_eq!(expansion.archive_topics(), vec!["uncategorized"]);
        expansion.topics = vec!["a".into()];
        assert_eq!(expansion.archive_topics(), vec!["a"]);
    }
}
