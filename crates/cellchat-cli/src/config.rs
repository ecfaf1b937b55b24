//! Process configuration.
//!
//! An optional TOML file supplies the base values. Environment variables
//! (including those loaded from `.env`) override it. The result is built once
//! in `main` and handed to each component by value.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cellchat_agent::{DEFAULT_MAX_TURNS, ModelSettings};
use cellchat_web::WebConfig;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub prompts: PromptConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub api_version: String,
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let web = WebConfig::default();
        Self {
            bind: web.bind_addr,
            port: web.port,
            api_version: web.api_version,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub claude_model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_turns: u32,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let settings = ModelSettings::default();
        Self {
            api_key: None,
            base_url: settings.base_url,
            claude_model_id: settings.claude_model_id,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            max_turns: DEFAULT_MAX_TURNS,
            request_timeout_secs: settings.request_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub agent: PathBuf,
    pub llm: PathBuf,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            agent: PathBuf::from("prompts/agent-prompt.txt"),
            llm: PathBuf::from("prompts/llm-prompt.txt"),
        }
    }
}

/// Where capability configuration is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSourceKind {
    /// The SQLite `tool_config` table; changes apply at runtime.
    #[default]
    Store,
    /// Fixed at startup from `*_SEARCH_ENABLE` and credential variables.
    Env,
}

impl FromStr for ToolSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(Self::Store),
            "env" => Ok(Self::Env),
            other => bail!("unknown tool config source {other:?} (expected `store` or `env`)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub source: ToolSourceKind,
    pub database: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            source: ToolSourceKind::Store,
            database: PathBuf::from("data/cellchat.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Read `path` if it exists, then apply the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment variables looked up via `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(v) = var("CELLCHAT_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("CELLCHAT_PORT") {
            self.server.port = parse("CELLCHAT_PORT", &v)?;
        }
        if let Some(v) = var("CELLCHAT_API_KEY") {
            self.server.api_key = Some(v);
        }

        if let Some(v) = var("ANTHROPIC_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = var("ANTHROPIC_BASE_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = var("CLAUDE_MODEL_ID") {
            self.model.claude_model_id = v;
        }
        if let Some(v) = var("CLAUDE_MAX_TOKENS") {
            self.model.max_tokens = parse("CLAUDE_MAX_TOKENS", &v)?;
        }
        if let Some(v) = var("CLAUDE_TEMPERATURE") {
            self.model.temperature = parse("CLAUDE_TEMPERATURE", &v)?;
        }
        if let Some(v) = var("AGENT_MAX_TURNS") {
            self.model.max_turns = parse("AGENT_MAX_TURNS", &v)?;
        }

        if let Some(v) = var("AGENT_PROMPT_PATH") {
            self.prompts.agent = PathBuf::from(v);
        }
        if let Some(v) = var("LLM_PROMPT_PATH") {
            self.prompts.llm = PathBuf::from(v);
        }

        if let Some(v) = var("TOOL_CONFIG_SOURCE") {
            self.tools.source = v.parse()?;
        }
        if let Some(v) = var("CELLCHAT_DB") {
            self.tools.database = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn web_config(&self) -> WebConfig {
        WebConfig {
            bind_addr: self.server.bind.clone(),
            port: self.server.port,
            api_version: self.server.api_version.clone(),
            api_key: self.server.api_key.clone(),
        }
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            api_key: self.model.api_key.clone().unwrap_or_default(),
            base_url: self.model.base_url.clone(),
            claude_model_id: self.model.claude_model_id.clone(),
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
            request_timeout: Duration::from_secs(self.model.request_timeout_secs),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("{key} has an invalid value: {value:?}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
