//! Research tools available to the agent
//!
//! # Module Structure
//!
//! - [`registry`] - the [`Tool`](registry::Tool) trait and name lookup
//! - [`dispatcher`] - concurrent execution of one turn's tool calls
//! - [`safety`] - outbound URL checks (scheme, port, resolved address)
//! - [`cache`] - on-disk content cache keyed by normalized URL
//! - [`fetch`] - `fetch_page`
//! - [`social`] - `fetch_social_post`
//! - [`search`] - `web_search` via DuckDuckGo
//! - [`github`] - `code_search` and `code_repo_info`
//!
//! Every tool returns text on success and a [`ToolError`] on failure; the
//! dispatcher turns errors into text so the model can adapt.

/// On-disk content cache.
pub mod cache;
/// Concurrent tool dispatch.
pub mod dispatcher;
/// Page fetching with manual redirects.
pub mod fetch;
/// GitHub repository search and metadata.
pub mod github;
/// Tool registration and discovery.
pub mod registry;
/// URL safety checks.
pub mod safety;
/// Web search using DuckDuckGo.
pub mod search;
/// Social post fetching via the fxtwitter API.
pub mod social;

pub use cache::{CacheKind, CacheStats, ContentCache};
pub use dispatcher::{ToolCallRecord, ToolDispatcher};
pub use registry::{Tool, ToolRegistry};
pub use safety::UrlPolicy;

use std::sync::Arc;
use std::time::Duration;

/// Typed failure of a single tool call. The `Display` text is what the model sees.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Blocked: {0}")]
    Blocked(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("{0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ToolError::Http(status.as_u16()),
            None if err.is_decode() => ToolError::Parse(err.to_string()),
            None => ToolError::Network(err.to_string()),
        }
    }
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{}' parameter", key)))
}

/// Read an optional positive integer argument.
pub(crate) fn optional_usize(args: &serde_json::Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

/// Settings shared by the network tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub user_agent: String,
    pub fetch_timeout: Duration,
    pub max_redirects: usize,
    pub max_content_chars: usize,
    pub github_api_base: String,
    pub github_token: Option<String>,
    pub social_api_base: String,
    /// Disable the private-address checks; only for tests against a local mock server.
    pub allow_private_hosts: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("delve/{} (research agent)", env!("CARGO_PKG_VERSION")),
            fetch_timeout: Duration::from_secs(30),
            max_redirects: 5,
            max_content_chars: 50_000,
            github_api_base: "https://api.github.com".to_string(),
            github_token: None,
            social_api_base: "https://api.fxtwitter.com".to_string(),
            allow_private_hosts: false,
        }
    }
}

/// Shared state handed to every network tool: one HTTP client, the cache and the URL policy.
#[derive(Clone)]
pub struct ToolContext {
    pub http: reqwest::Client,
    pub cache: Option<Arc<ContentCache>>,
    pub policy: UrlPolicy,
    pub settings: Arc<ToolSettings>,
}

impl ToolContext {
    /// Build the context. Redirects are disabled on the client; callers follow them by hand.
    pub fn new(settings: ToolSettings, cache: Option<Arc<ContentCache>>) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.fetch_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ToolError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            cache,
            policy: UrlPolicy::new(settings.allow_private_hosts),
            settings: Arc::new(settings),
        })
    }
}

impl ToolRegistry {
    /// Registry holding the five research tools.
    pub fn research_tools(ctx: ToolContext) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(fetch::FetchPageTool::new(ctx.clone())));
        registry.register(Arc::new(social::SocialPostTool::new(ctx.clone())));
        registry.register(Arc::new(search::WebSearchTool::new()));
        registry.register(Arc::new(github::CodeSearchTool::new(ctx.clone())));
        registry.register(Arc::new(github::CodeRepoInfoTool::new(ctx)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let args = json!({"url": "https://example.com", "empty": "  "});
        assert_eq!(required_str(&args, "url").unwrap(), "https://example.com");
        assert!(matches!(
            required_str(&args, "empty"),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(required_str(&args, "missing").is_err());
    }

    #[test]
    fn test_optional_usize() {
        let args = json!({"limit": 3, "zero": 0});
        assert_eq!(optional_usize(&args, "limit", 5), 3);
        assert_eq!(optional_usize(&args, "zero", 5), 5);
        assert_eq!(optional_usize(&args, "missing", 5), 5);
    }

    #[test]
    fn test_research_registry() {
        let ctx = ToolContext::new(ToolSettings::default(), None).unwrap();
        let registry = ToolRegistry::research_tools(ctx);
        let mut names = registry.tool_names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "code_repo_info",
                "code_search",
                "fetch_page",
                "fetch_social_post",
                "web_search"
            ]
        );
    }

    #[test]
    fn test_error_text() {
        assert_eq!(ToolError::Http(404).to_string(), "HTTP 404");
        assert_eq!(
            ToolError::Blocked("port 22 is not allowed".into()).to_string(),
            "Blocked: port 22 is not allowed"
        );
    }
}
