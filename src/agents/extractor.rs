//! Recover the structured findings from a finished transcript.

use crate::llm::messages::Transcript;
use crate::types::{Expansion, InboxItem, RelatedItem};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

/// Field every findings block must carry.
pub const SENTINEL_FIELD: &str = "source_summary";

/// Shape of the JSON block the model is asked to emit.
#[derive(Debug, Clone, Deserialize)]
pub struct StructuredFindings {
    pub source_summary: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub related: Vec<RelatedItem>,
    pub assessment: String,
    #[serde(default)]
    pub research_notes: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl StructuredFindings {
    pub fn into_expansion(self, item: &InboxItem) -> Expansion {
        Expansion {
            item_id: item.id.clone(),
            source_url: item.source_url(),
            source_summary: self.source_summary,
            key_points: self.key_points,
            related: self.related,
            assessment: self.assessment,
            research_notes: self.research_notes,
            topics: self.topics,
            expanded_at: Utc::now(),
        }
    }
}

/// Bodies of all fenced blocks tagged `json`, in order of appearance.
pub fn json_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let Some(line_end) = after_fence.find('\n') else {
            break;
        };
        let tag = after_fence[..line_end].trim();
        let body_start = &after_fence[line_end + 1..];
        let Some(close) = body_start.find("```") else {
            break;
        };
        if tag.eq_ignore_ascii_case("json") {
            blocks.push(&body_start[..close]);
        }
        rest = &body_start[close + 3..];
    }

    blocks
}

/// Newest parseable findings block, scanning assistant messages newest first,
/// together with the block's JSON exactly as the model wrote it.
/// Malformed candidates are skipped.
pub fn find_findings(transcript: &Transcript) -> Option<(StructuredFindings, Value)> {
    for message in transcript.assistant_messages_rev() {
        for block in json_blocks(&message.content).into_iter().rev() {
            if !block.contains(SENTINEL_FIELD) {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(block).and_then(|raw| {
                StructuredFindings::deserialize(&raw).map(|findings| (findings, raw))
            });
            match parsed {
                Ok(found) => return Some(found),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed findings block");
                }
            }
        }
    }
    None
}

/// Result of scanning a finished transcript.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub expansion: Expansion,
    /// The winning block as written; `None` for the fallback.
    pub raw_output: Option<Value>,
}

/// Always returns an expansion; falls back to the incomplete marker.
pub fn extract(transcript: &Transcript, item: &InboxItem) -> Extraction {
    match find_findings(transcript) {
        Some((findings, raw)) => Extraction {
            expansion: findings.into_expansion(item),
            raw_output: Some(raw),
        },
        None => {
            tracing::warn!(item_id = %item.id, "no structured output found; using fallback expansion");
            Extraction {
                expansion: Expansion::incomplete(item),
                raw_output: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::messages::ConversationMessage;
    use crate::types::INCOMPLETE_MARKER;

    const GOOD: &str = r#"Here are my findings:
```json
{
  "source_summary": "A post on turn budgets",
  "key_points": ["Count-based termination"],
  "related": [{"url": "https://a.example", "title": "A", "relevance": "r", "source": "web search"}],
  "assessment": "Useful",
  "topics": ["agent-design"]
}
```"#;

    fn item() -> InboxItem {
        InboxItem::from_content("20240101_000000", "https://example.com/post")
    }

    #[test]
    fn test_json_blocks() {
        let text = "a\n```rust\nfn x() {}\n```\nb\n```json\n{\"k\": 1}\n```\n```JSON\n[]\n```";
        assert_eq!(json_blocks(text), vec!["{\"k\": 1}\n", "[]\n"]);
        assert!(json_blocks("```json\nunterminated").is_empty());
    }

    #[test]
    fn test_extracts_latest_block() {
        let transcript = Transcript::from(vec![
            ConversationMessage::system("sys"),
            ConversationMessage::assistant(GOOD.replace("Useful", "Old draft"), vec![]),
            ConversationMessage::assistant(GOOD, vec![]),
        ]);
        let expansion = extract(&transcript, &item()).expansion;
        assert_eq!(expansion.assessment, "Useful");
        assert_eq!(expansion.topics, vec!["agent-design"]);
        assert_eq!(expansion.related.len(), 1);
        assert_eq!(expansion.source_url.as_deref(), Some("https://example.com/post"));
    }

    #[test]
    fn test_malformed_latest_falls_back_to_older() {
        let broken = "```json\n{\"source_summary\": \"half\", \"key_points\": [\n```";
        let transcript = Transcript::from(vec![
            ConversationMessage::assistant(GOOD, vec![]),
            ConversationMessage::user("continue"),
            ConversationMessage::assistant(broken, vec![]),
        ]);
        let expansion = extract(&transcript, &item()).expansion;
        assert_eq!(expansion.source_summary, "A post on turn budgets");
    }

    #[test]
    fn test_missing_required_field_is_skipped() {
        let no_assessment =
            "```json\n{\"source_summary\": \"s\", \"key_points\": []}\n```";
        let transcript =
            Transcript::from(vec![ConversationMessage::assistant(no_assessment, vec![])]);
        assert!(find_findings(&transcript).is_none());
    }

    #[test]
    fn test_ignores_non_assistant_messages() {
        let transcript = Transcript::from(vec![ConversationMessage::user(GOOD)]);
        assert!(find_findings(&transcript).is_none());
    }

    #[test]
    fn test_fallback_expansion() {
        let transcript = Transcript::from(vec![ConversationMessage::assistant("no json here", vec![])]);
        let expansion = extract(&transcript, &item()).expansion;
        assert!(expansion.source_summary.starts_with(INCOMPLETE_MARKER));
        assert!(expansion.key_points.is_empty());
        assert!(expansion.topics.is_empty());
    }
}
