//! `web_search` implementation using daedra
//!
//! daedra queries DuckDuckGo, so no API key is needed.

use crate::tools::registry::Tool;
use crate::tools::{optional_usize, required_str, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};

const SNIPPET_CHARS: usize = 200;

/// One search hit, backend independent.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Render hits the way the model sees them.
pub fn render_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No web results found".to_string();
    }
    let mut lines = vec![format!("Web search results for '{}':", query)];
    for hit in hits {
        let title = if hit.title.is_empty() { "No title" } else { &hit.title };
        lines.push(format!("- [{}]({})", title, hit.url));
        let snippet: String = hit.snippet.chars().take(SNIPPET_CHARS).collect();
        if !snippet.trim().is_empty() {
            lines.push(format!("  {}...", snippet.trim()));
        }
    }
    lines.join("\n")
}

/// Web search tool powered by daedra
pub struct WebSearchTool;

impl WebSearchTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for articles, blog posts, discussions and documentation. \
         This is the primary discovery tool for non-code sources."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = required_str(&args, "query")?;
        let num_results = optional_usize(&args, "max_results", 5);

        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let hits: Vec<SearchHit> = response
            .data
            .iter()
            .take(num_results)
            .map(|r| SearchHit {
                title: r.title.to_string(),
                url: r.url.to_string(),
                snippet: r.description.to_string(),
            })
            .collect();

        Ok(render_hits(query, &hits))
    }

    fn error_context(&self) -> &str {
        "Web search error"
    }
}
