//! TOML-based configuration for delve
//!
//! Everything lives in one file (`delve.toml`). Every section and field has a
//! default, so a missing file is a valid configuration. Secrets are never
//! stored in the file: it names the environment variables that hold them.
//!
//! ```toml
//! [agent]
//! max_turns = 10
//!
//! [provider]
//! type = "anthropic"
//! api_key_env = "ANTHROPIC_API_KEY"
//! model = "claude-sonnet-4-20250514"
//!
//! [paths]
//! archive = "archive"
//!
//! [eval]
//! k = 3
//! threshold = 0.7
//! ```

use crate::agents::OrchestratorConfig;
use crate::llm::{ModelParams, Provider};
use crate::research::RunnerPaths;
use crate::tools::ToolSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure loaded from delve.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelveConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============= Agent Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on model calls per seed
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    pub temperature: Option<f32>,
}

fn default_max_turns() -> usize {
    10
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Anthropic {
        /// Environment variable containing the API key
        #[serde(default = "default_anthropic_key_env")]
        api_key_env: String,
        #[serde(default = "default_anthropic_base")]
        api_base: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        model: String,
    },
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Anthropic {
            api_key_env: default_anthropic_key_env(),
            api_base: default_anthropic_base(),
            model: default_anthropic_model(),
        }
    }
}

// ============= Paths Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,
    #[serde(default = "default_expanded")]
    pub expanded: PathBuf,
    #[serde(default = "default_archive")]
    pub archive: PathBuf,
    #[serde(default = "default_cache")]
    pub cache: PathBuf,
    #[serde(default = "default_trajectories")]
    pub trajectories: PathBuf,
    #[serde(default = "default_digests")]
    pub digests: PathBuf,
    #[serde(default = "default_world_view")]
    pub world_view: PathBuf,
}

fn default_inbox() -> PathBuf {
    PathBuf::from("inbox.jsonl")
}

fn default_expanded() -> PathBuf {
    PathBuf::from("expanded")
}

fn default_archive() -> PathBuf {
    PathBuf::from("archive")
}

fn default_cache() -> PathBuf {
    PathBuf::from("fetch_cache")
}

fn default_trajectories() -> PathBuf {
    PathBuf::from("trajectories")
}

fn default_digests() -> PathBuf {
    PathBuf::from("digests")
}

fn default_world_view() -> PathBuf {
    PathBuf::from("WORLD_VIEW.md")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            inbox: default_inbox(),
            expanded: default_expanded(),
            archive: default_archive(),
            cache: default_cache(),
            trajectories: default_trajectories(),
            digests: default_digests(),
            world_view: default_world_view(),
        }
    }
}

// ============= Tools Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Overrides the default `delve/<version>` user agent
    pub user_agent: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Environment variable holding an optional GitHub token
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_content_chars() -> usize {
    50_000
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            fetch_timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            max_content_chars: default_max_content_chars(),
            github_token_env: default_github_token_env(),
            cache_enabled: true,
        }
    }
}

// ============= Eval Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Runs per reliability test
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Model for judged evaluators; the agent model when unset
    pub judge_model: Option<String>,
}

fn default_k() -> usize {
    3
}

fn default_threshold() -> f64 {
    0.7
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            threshold: default_threshold(),
            judge_model: None,
        }
    }
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl DelveConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }

        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Load, requiring the file to exist.
    pub fn load_existing<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Self::load(path)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DelveConfig = toml::from_str(content)?;
        config.validate_values()?;
        Ok(config)
    }

    /// Range checks that do not depend on the environment.
    pub fn validate_values(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".to_string(),
            ));
        }
        if self.eval.k == 0 {
            return Err(ConfigError::ValidationError(
                "eval.k must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.eval.threshold) {
            return Err(ConfigError::ValidationError(format!(
                "eval.threshold must be within [0, 1], got {}",
                self.eval.threshold
            )));
        }
        if let Some(t) = self.agent.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "agent.temperature must be within [0, 2], got {}",
                    t
                )));
            }
        }
        Ok(())
    }

    /// Full validation, including the provider's API key variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_values()?;
        if let ProviderConfig::Anthropic { api_key_env, .. } = &self.provider {
            self.validate_env_var(api_key_env)?;
        }
        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|v| !v.is_empty())
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            temperature: self.agent.temperature,
            max_tokens: self.agent.max_tokens,
        }
    }

    /// The agent's model provider, with its API key resolved.
    pub fn to_provider(&self) -> Result<Provider, ConfigError> {
        let params = self.model_params();
        match &self.provider {
            ProviderConfig::Anthropic {
                api_key_env,
                api_base,
                model,
            } => Ok(Provider::Anthropic {
                api_key: self
                    .resolve_env(api_key_env)
                    .ok_or_else(|| ConfigError::MissingEnvVar(api_key_env.clone()))?,
                api_base: api_base.clone(),
                model: model.clone(),
                params,
            }),
            ProviderConfig::Ollama { base_url, model } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
                params,
            }),
        }
    }

    /// Provider for judged evaluators.
    pub fn judge_provider(&self) -> Result<Provider, ConfigError> {
        let provider = self.to_provider()?;
        Ok(match &self.eval.judge_model {
            Some(model) => provider.with_model(model.clone()),
            None => provider,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_turns: self.agent.max_turns,
        }
    }

    pub fn tool_settings(&self) -> ToolSettings {
        let defaults = ToolSettings::default();
        ToolSettings {
            user_agent: self.tools.user_agent.clone().unwrap_or(defaults.user_agent),
            fetch_timeout: Duration::from_secs(self.tools.fetch_timeout_secs),
            max_redirects: self.tools.max_redirects,
            max_content_chars: self.tools.max_content_chars,
            github_token: self.resolve_env(&self.tools.github_token_env),
            ..defaults
        }
    }

    pub fn runner_paths(&self) -> RunnerPaths {
        RunnerPaths {
            inbox: self.paths.inbox.clone(),
            expanded: self.paths.expanded.clone(),
            archive: self.paths.archive.clone(),
            trajectories: self.paths.trajectories.clone(),
            world_view: Some(self.paths.world_view.clone()),
        }
    }
}
