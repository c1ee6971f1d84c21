//! `code_search` and `code_repo_info` backed by the GitHub REST API.

use crate::tools::registry::Tool;
use crate::tools::{optional_usize, required_str, ToolContext, ToolError};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

const README_EXCERPT_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct RepoSummary {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoSummary>,
}

/// Extract `(owner, repo)` from a github.com URL.
pub fn parse_repo_url(raw: &str) -> Option<(String, String)> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host != "github.com" && host != "www.github.com" {
        return None;
    }
    let mut parts = url.path().split('/').filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?.trim_end_matches(".git");
    Some((owner.to_string(), repo.to_string()))
}

fn api_request(ctx: &ToolContext, url: &str, accept: &str) -> reqwest::RequestBuilder {
    let mut request = ctx.http.get(url).header("Accept", accept);
    if let Some(token) = &ctx.settings.github_token {
        request = request.header("Authorization", format!("token {}", token));
    }
    request
}

fn api_base(ctx: &ToolContext) -> &str {
    ctx.settings.github_api_base.trim_end_matches('/')
}

pub struct CodeSearchTool {
    ctx: ToolContext,
}

impl CodeSearchTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<RepoSummary>, ToolError> {
        let url = format!("{}/search/repositories", api_base(&self.ctx));
        let response = api_request(&self.ctx, &url, "application/vnd.github.v3+json")
            .query(&[
                ("q", query.to_string()),
                ("sort", "stars".to_string()),
                ("per_page", limit.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(status.as_u16()));
        }
        let body: SearchResponse = response.json().await?;
        Ok(body.items.into_iter().take(limit).collect())
    }
}

#[async_trait]
impl Tool for CodeSearchTool {
    fn name(&self) -> &str {
        "code_search"
    }

    fn description(&self) -> &str {
        "Search GitHub repositories by query, sorted by stars. Use to find code \
         implementations and open source projects."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Repository search query"},
                "limit": {"type": "integer", "description": "Maximum results (default: 5)", "default": 5}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = required_str(&args, "query")?;
        let limit = optional_usize(&args, "limit", 5);
        let repos = self.search(query, limit).await?;

        if repos.is_empty() {
            return Ok("No repositories found".to_string());
        }
        let mut lines = vec![format!("Search results for '{}':", query)];
        for r in &repos {
            lines.push(format!(
                "- {} ({} stars): {}",
                r.full_name,
                r.stargazers_count,
                r.description.as_deref().unwrap_or("No description")
            ));
        }
        Ok(lines.join("\n"))
    }

    fn error_context(&self) -> &str {
        "Code search error"
    }
}

pub struct CodeRepoInfoTool {
    ctx: ToolContext,
}

impl CodeRepoInfoTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn info(&self, owner: &str, repo: &str) -> Result<(RepoSummary, Option<String>), ToolError> {
        let url = format!("{}/repos/{}/{}", api_base(&self.ctx), owner, repo);
        let response = api_request(&self.ctx, &url, "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::NotFound("Repository not found".to_string()));
        }
        if !status.is_success() {
            return Err(ToolError::Http(status.as_u16()));
        }
        let summary: RepoSummary = response.json().await?;

        // README is best effort
        let readme = match api_request(&self.ctx, &format!("{}/readme", url), "application/vnd.github.v3.raw")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .text()
                .await
                .ok()
                .map(|text| text.chars().take(README_EXCERPT_CHARS).collect()),
            _ => None,
        };

        Ok((summary, readme))
    }
}

#[async_trait]
impl Tool for CodeRepoInfoTool {
    fn name(&self) -> &str {
        "code_repo_info"
    }

    fn description(&self) -> &str {
        "Get details about a GitHub repository: description, stars, language, topics \
         and a README excerpt. Do not also fetch_page the same repository."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {"type": "string", "description": "Repository owner"},
                "repo": {"type": "string", "description": "Repository name"}
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let owner = required_str(&args, "owner")?;
        let repo = required_str(&args, "repo")?;
        let (summary, readme) = self.info(owner, repo).await?;

        Ok(format!(
            "Repository: {}\nDescription: {}\nStars: {}\nLanguage: {}\nTopics: {}\nREADME excerpt:\n{}",
            summary.full_name,
            summary.description.as_deref().unwrap_or("N/A"),
            summary.stargazers_count,
            summary.language.as_deref().unwrap_or("N/A"),
            if summary.topics.is_empty() {
                "N/A".to_string()
            } else {
                summary.topics.join(", ")
            },
            readme.as_deref().unwrap_or("N/A")
        ))
    }

    fn error_context(&self) -> &str {
        "Error fetching repository"
    }
}
