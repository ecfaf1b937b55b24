//! Shared helper functions used across CLI subcommands.

use std::sync::Arc;

use anyhow::{Context, Result};
use cellchat_agent::SystemPrompt;
use cellchat_store::{Database, ToolConfigStore};
use cellchat_tools::{EnvToolSource, StoreToolSource, ToolEnvConfig, ToolRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;
use crate::config::{AppConfig, ToolSourceKind, ToolsConfig};

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub struct Prompts {
    pub agent: SystemPrompt,
    pub llm: SystemPrompt,
}

/// Load both system prompts. Either one missing is fatal.
pub fn load_prompts(config: &AppConfig) -> Result<Prompts> {
    let agent = SystemPrompt::load(&config.prompts.agent)
        .with_context(|| format!("agent prompt {}", config.prompts.agent.display()))?;
    let llm = SystemPrompt::load(&config.prompts.llm)
        .with_context(|| format!("llm prompt {}", config.prompts.llm.display()))?;
    Ok(Prompts { agent, llm })
}

// ---------------------------------------------------------------------------
// Tool configuration
// ---------------------------------------------------------------------------

/// Open, migrate and seed the configuration store.
pub async fn open_tool_store(tools: &ToolsConfig) -> Result<ToolConfigStore> {
    if let Some(dir) = tools.database.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let db = Database::open_and_migrate(tools.database.clone())
        .await
        .with_context(|| format!("failed to open database {}", tools.database.display()))?;
    let store = ToolConfigStore::open(db)
        .await
        .context("failed to load tool configuration")?;
    store
        .seed_defaults()
        .await
        .context("failed to seed tool configuration")?;
    info!(path = %tools.database.display(), "tool config store ready");
    Ok(store)
}

/// Build the registry over the configured source. The store is returned too
/// when it backs the registry, so callers can write to it.
pub async fn build_registry(
    tools: &ToolsConfig,
) -> Result<(ToolRegistry, Option<ToolConfigStore>)> {
    match tools.source {
        ToolSourceKind::Store => {
            let store = open_tool_store(tools).await?;
            let registry = ToolRegistry::new(Arc::new(StoreToolSource::new(store.clone())));
            Ok((registry, Some(store)))
        }
        ToolSourceKind::Env => {
            let registry =
                ToolRegistry::new(Arc::new(EnvToolSource::new(ToolEnvConfig::from_env())));
            Ok((registry, None))
        }
    }
}
