//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod mocks;

use chrono::Utc;
use delve::types::{Expansion, InboxItem, RelatedItem};

pub fn seed(id: &str, content: &str) -> InboxItem {
    InboxItem::from_content(id, content)
}

/// Complete expansion with the given topics.
pub fn expansion(id: &str, topics: &[&str]) -> Expansion {
    Expansion {
        item_id: id.to_string(),
        source_url: Some(format!("https://example.com/{}", id)),
        source_summary: format!("Summary of {}", id),
        key_points: vec!["first".to_string(), "second".to_string()],
        related: vec![RelatedItem {
            url: "https://related.example.com".to_string(),
            title: "Related".to_string(),
            relevance: "same area".to_string(),
            source: "web search".to_string(),
        }],
        assessment: "useful".to_string(),
        research_notes: None,
        topics: topics.iter().map(|t| t.to_string()).collect(),
        expanded_at: Utc::now(),
    }
}
