//! `fetch_page`: safety-checked page fetch with manual redirect handling.

use crate::tools::cache::CacheKind;
use crate::tools::registry::Tool;
use crate::tools::{required_str, ToolContext, ToolError};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Url;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SKIP_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "noscript", "template"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6",
    "pre", "blockquote",
];

/// Fetched page, as cached and as rendered to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageContent {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub content_type: String,
}

impl PageContent {
    pub fn render(&self) -> String {
        format!(
            "Title: {}\n\nContent:\n{}",
            self.title.as_deref().unwrap_or("N/A"),
            self.content
        )
    }
}

pub struct FetchPageTool {
    ctx: ToolContext,
}

impl FetchPageTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    /// Fetch a page, serving from the cache when possible.
    pub async fn fetch(&self, raw_url: &str) -> Result<PageContent, ToolError> {
        if let Some(cache) = &self.ctx.cache {
            if let Some(payload) = cache.get(CacheKind::Webpage, raw_url) {
                if let Ok(page) = serde_json::from_value::<PageContent>(payload) {
                    return Ok(page);
                }
            }
        }

        let url = self.ctx.policy.validate(raw_url).await?;
        let response = self.follow_redirects(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;
        let max_chars = self.ctx.settings.max_content_chars;

        let (title, content) = if content_type.contains("text/html") {
            let (title, text) = html_to_text(&body);
            (title, truncate_content(&text, max_chars))
        } else if content_type.contains("json") {
            let pretty = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| serde_json::to_string_pretty(&v).ok())
                .unwrap_or(body);
            (None, truncate_content(&pretty, max_chars))
        } else {
            (None, truncate_content(&body, max_chars))
        };

        let page = PageContent {
            url: raw_url.to_string(),
            title,
            content,
            content_type,
        };

        if let Some(cache) = &self.ctx.cache {
            let payload = serde_json::to_value(&page)
                .map_err(|e| ToolError::Parse(e.to_string()))?;
            if let Err(e) = cache.put(CacheKind::Webpage, raw_url, payload) {
                tracing::warn!(url = %raw_url, error = %e, "failed to write fetch cache");
            }
        }

        Ok(page)
    }

    /// GET the URL, following at most `max_redirects` hops and re-validating each target.
    async fn follow_redirects(&self, start: Url) -> Result<reqwest::Response, ToolError> {
        let max_redirects = self.ctx.settings.max_redirects;
        let mut current = start;

        for hop in 0..=max_redirects {
            let response = self.ctx.http.get(current.clone()).send().await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }
            if hop == max_redirects {
                break;
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ToolError::Network("redirect with no location".to_string()))?;
            let next = current
                .join(location)
                .map_err(|e| ToolError::Parse(format!("bad redirect location '{}': {}", location, e)))?;

            current = self
                .ctx
                .policy
                .validate(next.as_str())
                .await
                .map_err(|e| match e {
                    ToolError::Blocked(reason) => {
                        ToolError::Blocked(format!("redirect to {}: {}", next, reason))
                    }
                    other => other,
                })?;
            tracing::debug!(hop = hop + 1, url = %current, "following redirect");
        }

        Err(ToolError::Network("too many redirects".to_string()))
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch and read content from a URL. Returns the page title and text. \
         Does NOT work for Twitter/X posts - use fetch_social_post instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL of the page to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let url = required_str(&args, "url")?;
        Ok(self.fetch(url).await?.render())
    }

    fn error_context(&self) -> &str {
        "Error fetching URL"
    }
}

/// Convert HTML into readable text, returning the `<title>` separately.
pub fn html_to_text(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);
    let mut title = None;
    let mut out = String::new();
    walk(document.root_element(), &mut title, &mut out);

    let lines: Vec<String> = out
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    (title, lines.join("\n"))
}

fn walk(element: ElementRef<'_>, title: &mut Option<String>, out: &mut String) {
    let name = element.value().name();
    if SKIP_TAGS.contains(&name) {
        return;
    }
    if name == "title" {
        let text: String = element.text().collect::<String>().trim().to_string();
        if title.is_none() && !text.is_empty() {
            *title = Some(text);
        }
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    walk(child_el, title, out);
                }
            }
            _ => {}
        }
    }

    if BLOCK_TAGS.contains(&name) {
        out.push('\n');
    }
}

/// Cut to `max_chars` characters, appending a `[truncated]` marker.
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_skips_chrome() {
        let html = r#"<html><head><title> Turn budgets </title><style>p{}</style></head>
            <body><nav>Home | About</nav><header>Site</header>
            <h1>Bounded agents</h1><p>Count-based   termination.</p>
            <script>alert(1)</script><footer>(c)</footer></body></html>"#;
        let (title, text) = html_to_text(html);
        assert_eq!(title.as_deref(), Some("Turn budgets"));
        assert!(text.contains("Bounded agents"));
        assert!(text.contains("Count-based termination."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("(c)"));
        assert!(!text.contains("Site"));
    }

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("abcdef", 3), "abc\n[truncated]");
        assert_eq!(truncate_content("ééé", 2), "éé\n[truncated]");
    }

    #[test]
    fn test_render() {
        let page = PageContent {
            url: "https://example.com".into(),
            title: None,
            content: "body".into(),
            content_type: "text/plain".into(),
        };
        assert_eq!(page.render(), "Title: N/A\n\nContent:\nbody");
    }
}
