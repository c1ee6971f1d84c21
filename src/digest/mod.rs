//! Digest synthesis and markdown rendering.
//!
//! A digest is rebuilt from scratch on every run. The model is asked for a
//! fenced JSON block; when that fails each expansion gets a plain entry.

use crate::agents::extractor::json_blocks;
use crate::llm::LLMClient;
use crate::types::{Digest, DigestEntry, Expansion, InboxItem};
use chrono::Local;
use serde::Deserialize;
use std::collections::HashMap;

const ONE_LINER_CHARS: usize = 100;

#[derive(Deserialize)]
struct Synthesis {
    #[serde(default)]
    entries: Vec<DigestEntry>,
    #[serde(default)]
    cross_connections: Vec<String>,
    #[serde(default)]
    open_threads: Vec<String>,
}

pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn describe(exp: &Expansion, item: Option<&InboxItem>) -> String {
    let source = item.map(|i| i.content.as_str()).unwrap_or("Unknown");
    let focus = item
        .and_then(|i| i.note.as_deref())
        .unwrap_or("None specified");
    let points: Vec<String> = exp.key_points.iter().map(|p| format!("- {}", p)).collect();
    let related: Vec<String> = exp
        .related
        .iter()
        .map(|r| format!("- {}: {} ({})", r.title, r.url, r.relevance))
        .collect();

    format!(
        "Item ID: {}\nSource: {}\nUser's focus: {}\n\nSummary: {}\n\nKey points:\n{}\n\nAssessment: {}\n\nRelated items found:\n{}\n",
        exp.item_id,
        source,
        focus,
        exp.source_summary,
        points.join("\n"),
        exp.assessment,
        if related.is_empty() {
            "None".to_string()
        } else {
            related.join("\n")
        }
    )
}

pub fn digest_prompt(expansions: &[Expansion], items: &HashMap<String, InboxItem>) -> String {
    let texts: Vec<String> = expansions
        .iter()
        .map(|exp| describe(exp, items.get(&exp.item_id)))
        .collect();

    format!(
        r#"Synthesize these research expansions into a scannable daily digest.

EXPANSIONS:
{}

For each expansion, provide:
1. A short title (3-5 words)
2. A one-liner summary
3. The single most important finding
4. 0-3 links worth following up (from the related items)

Also identify:
- Cross-connections between items (if any)
- Open threads worth investigating further

Output JSON:
```json
{{
  "entries": [
    {{
      "item_id": "...",
      "title": "...",
      "one_liner": "...",
      "key_finding": "...",
      "worth_following": ["url1", "url2"]
    }}
  ],
  "cross_connections": ["Connection 1"],
  "open_threads": ["Thread 1"]
}}
```"#,
        texts.join("---")
    )
}

/// One plain entry per expansion.
pub fn fallback_digest(expansions: &[Expansion]) -> Digest {
    Digest {
        date: today(),
        entries: expansions
            .iter()
            .map(|exp| DigestEntry {
                item_id: exp.item_id.clone(),
                title: "Expansion".to_string(),
                one_liner: exp.source_summary.chars().take(ONE_LINER_CHARS).collect(),
                key_finding: exp
                    .key_points
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "See full expansion".to_string()),
                worth_following: Vec::new(),
            })
            .collect(),
        cross_connections: Vec::new(),
        open_threads: Vec::new(),
    }
}

fn parse_synthesis(reply: &str) -> Option<Synthesis> {
    json_blocks(reply)
        .into_iter()
        .find_map(|block| serde_json::from_str::<Synthesis>(block).ok())
}

/// Ask the model for a digest. Never fails: any error gives the fallback digest.
pub async fn create_digest(
    expansions: &[Expansion],
    items: &HashMap<String, InboxItem>,
    client: Option<&dyn LLMClient>,
) -> Digest {
    if expansions.is_empty() {
        return Digest {
            date: today(),
            entries: Vec::new(),
            cross_connections: Vec::new(),
            open_threads: Vec::new(),
        };
    }
    let Some(client) = client else {
        return fallback_digest(expansions);
    };

    match client.generate(&digest_prompt(expansions, items)).await {
        Ok(reply) => match parse_synthesis(&reply) {
            Some(synthesis) => Digest {
                date: today(),
                entries: synthesis.entries,
                cross_connections: synthesis.cross_connections,
                open_threads: synthesis.open_threads,
            },
            None => {
                tracing::warn!("digest reply had no usable JSON block; using fallback");
                fallback_digest(expansions)
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "digest synthesis failed; using fallback");
            fallback_digest(expansions)
        }
    }
}

pub fn render_markdown(digest: &Digest, items: &HashMap<String, InboxItem>) -> String {
    let mut lines = vec![format!("# Daily Digest - {}", digest.date), String::new()];

    if digest.entries.is_empty() {
        lines.push("*No items processed today.*".to_string());
        return lines.join("\n");
    }

    lines.push("## What Was Processed".to_string());
    lines.push(String::new());
    for entry in &digest.entries {
        let source = items
            .get(&entry.item_id)
            .map(|i| i.content.as_str())
            .unwrap_or("Unknown source");
        lines.push(format!("### {}", entry.title));
        lines.push(format!("*Source: {}*", source));
        lines.push(String::new());
        lines.push(entry.one_liner.clone());
        lines.push(String::new());
        lines.push(format!("**Key finding:** {}", entry.key_finding));
        if !entry.worth_following.is_empty() {
            lines.push(String::new());
            lines.push("**Worth following:**".to_string());
            lines.extend(entry.worth_following.iter().map(|l| format!("- {}", l)));
        }
        lines.push(String::new());
    }

    for (heading, bullets) in [
        ("## Connections", &digest.cross_connections),
        ("## Open Threads", &digest.open_threads),
    ] {
        if bullets.is_empty() {
            continue;
        }
        lines.push(heading.to_string());
        lines.push(String::new());
        lines.extend(bullets.iter().map(|b| format!("- {}", b)));
        lines.push(String::new());
    }

    lines.join("\n")
}
