//! `fetch_social_post`: Twitter/X posts through the fxtwitter JSON API.

use crate::tools::cache::CacheKind;
use crate::tools::registry::Tool;
use crate::tools::{required_str, ToolContext, ToolError};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SOCIAL_HOSTS: &[&str] = &["twitter.com", "x.com", "www.twitter.com", "www.x.com"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SocialPost {
    pub url: String,
    pub author: Option<String>,
    pub author_handle: Option<String>,
    pub text: String,
    pub created_at: Option<String>,
    pub likes: Option<u64>,
    pub reposts: Option<u64>,
    pub replies: Option<u64>,
    pub views: Option<u64>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    /// Set for long-form article posts
    pub article_title: Option<String>,
}

fn count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}

impl SocialPost {
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!(
                "Author: {} (@{})",
                self.author.as_deref().unwrap_or("unknown"),
                self.author_handle.as_deref().unwrap_or("unknown")
            ),
            format!("Posted: {}", self.created_at.as_deref().unwrap_or("unknown")),
            String::new(),
        ];
        if let Some(title) = &self.article_title {
            lines.push(format!("# {}", title));
            lines.push(String::new());
        }
        lines.push(self.text.clone());
        lines.push(String::new());
        lines.push(format!(
            "Engagement: {} likes, {} reposts, {} replies, {} views",
            count(self.likes),
            count(self.reposts),
            count(self.replies),
            count(self.views)
        ));
        if !self.media_urls.is_empty() {
            lines.push(format!("\nMedia: {}", self.media_urls.join(", ")));
        }
        lines.join("\n")
    }
}

/// Extract `(user, status_id)` from a Twitter/X status URL.
pub fn parse_post_url(raw: &str) -> Option<(String, String)> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !SOCIAL_HOSTS.contains(&host.as_str()) {
        return None;
    }
    let parts: Vec<&str> = url.path().split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [user, "status", id, ..] => Some((user.to_string(), id.to_string())),
        _ => None,
    }
}

/// Render long-form article blocks as markdown.
pub fn render_article_blocks(article: &Value) -> Option<String> {
    let blocks = article.pointer("/content/blocks")?.as_array()?;
    let mut lines = Vec::new();

    for block in blocks {
        let kind = block.get("type").and_then(|v| v.as_str()).unwrap_or("");
        let text = block.get("text").and_then(|v| v.as_str()).unwrap_or("").trim();
        if text.is_empty() || kind == "atomic" {
            continue;
        }
        let line = match kind {
            "header-one" => format!("# {}", text),
            "header-two" => format!("## {}", text),
            "header-three" => format!("### {}", text),
            k if k.starts_with("header-") => format!("**{}**", text),
            "blockquote" => format!("> {}", text),
            "unordered-list-item" => format!("- {}", text),
            "ordered-list-item" => format!("1. {}", text),
            "code-block" => format!("```\n{}\n```", text),
            _ => text.to_string(),
        };
        lines.push(line);
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n\n"))
    }
}

pub struct SocialPostTool {
    ctx: ToolContext,
}

impl SocialPostTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<SocialPost, ToolError> {
        let (user, id) = parse_post_url(raw_url).ok_or_else(|| {
            ToolError::InvalidArguments("not a Twitter/X status URL".to_string())
        })?;

        if let Some(cache) = &self.ctx.cache {
            if let Some(payload) = cache.get(CacheKind::SocialPost, raw_url) {
                if let Ok(post) = serde_json::from_value::<SocialPost>(payload) {
                    return Ok(post);
                }
            }
        }

        let api_url = format!(
            "{}/{}/status/{}",
            self.ctx.settings.social_api_base.trim_end_matches('/'),
            user,
            id
        );
        let response = self.ctx.http.get(&api_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(status.as_u16()));
        }
        let data: Value = response.json().await?;

        if data.get("code").and_then(|v| v.as_u64()) != Some(200) {
            let message = data
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error");
            return Err(ToolError::NotFound(message.to_string()));
        }

        let tweet = data
            .get("tweet")
            .ok_or_else(|| ToolError::Parse("response has no 'tweet' field".to_string()))?;
        let post = parse_post(raw_url, tweet);

        if let Some(cache) = &self.ctx.cache {
            let payload = serde_json::to_value(&post)
                .map_err(|e| ToolError::Parse(e.to_string()))?;
            if let Err(e) = cache.put(CacheKind::SocialPost, raw_url, payload) {
                tracing::warn!(url = %raw_url, error = %e, "failed to write fetch cache");
            }
        }

        Ok(post)
    }
}

fn parse_post(url: &str, tweet: &Value) -> SocialPost {
    let str_field = |v: &Value, key: &str| v.get(key).and_then(|s| s.as_str()).map(String::from);
    let num_field = |key: &str| tweet.get(key).and_then(|n| n.as_u64());

    let author = tweet.get("author").cloned().unwrap_or(Value::Null);
    let media_urls = tweet
        .pointer("/media/all")
        .and_then(|v| v.as_array())
        .map(|all| {
            all.iter()
                .filter_map(|m| m.get("url").and_then(|u| u.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let article = tweet.get("article");
    let article_title = article.and_then(|a| str_field(a, "title"));
    let text = article
        .and_then(render_article_blocks)
        .or_else(|| str_field(tweet, "text"))
        .unwrap_or_default();

    SocialPost {
        url: url.to_string(),
        author: str_field(&author, "name"),
        author_handle: str_field(&author, "screen_name"),
        text,
        created_at: str_field(tweet, "created_at"),
        likes: num_field("likes"),
        reposts: num_field("retweets"),
        replies: num_field("replies"),
        views: num_field("views"),
        media_urls,
        article_title,
    }
}

#[async_trait]
impl Tool for SocialPostTool {
    fn name(&self) -> &str {
        "fetch_social_post"
    }

    fn description(&self) -> &str {
        "Fetch a post from Twitter/X. Returns the post text (or full article), author, \
         engagement counts and media URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "A twitter.com or x.com status URL"
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
        "Error fetching post"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_post_url() {
        assert_eq!(
            parse_post_url("https://x.com/someone/status/12345"),
            Some(("someone".to_string(), "12345".to_string()))
        );
        assert_eq!(
            parse_post_url("https://www.twitter.com/a/status/9?s=20"),
            Some(("a".to_string(), "9".to_string()))
        );
        assert!(parse_post_url("https://x.com/someone").is_none());
        assert!(parse_post_url("https://example.com/a/status/1").is_none());
    }

    #[test]
    fn test_article_rendering() {
        let article = json!({
            "title": "Long read",
            "content": {"blocks": [
                {"type": "header-one", "text": "Intro"},
                {"type": "unstyled", "text": "Body text."},
                {"type": "atomic", "text": "img"},
                {"type": "unordered-list-item", "text": "point"},
                {"type": "code-block", "text": "fn main() {}"}
            ]}
        });
        let md = render_article_blocks(&article).unwrap();
        assert_eq!(
            md,
            "# Intro\n\nBody text.\n\n- point\n\n```\nfn main() {}\n```"
        );
    }

    #[test]
    fn test_parse_post_prefers_article() {
        let tweet = json!({
            "text": "short",
            "author": {"name": "Ada", "screen_name": "ada"},
            "likes": 3,
            "media": {"all": [{"url": "https://pbs.example/img.png"}]},
            "article": {"title": "T", "content": {"blocks": [{"type": "unstyled", "text": "long"}]}}
        });
        let post = parse_post("https://x.com/ada/status/1", &tweet);
        assert_eq!(post.text, "long");
        assert_eq!(post.article_title.as_deref(), Some("T"));
        assert_eq!(post.media_urls.len(), 1);
        let rendered = post.render();
        assert!(rendered.starts_with("Author: Ada (@ada)"));
        assert!(rendered.contains("# T"));
        assert!(rendered.contains("3 likes, ? reposts"));
    }
}
