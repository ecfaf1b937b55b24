//! CLI entry point for cellchat.
//!
//! This binary provides the `cellchat` command with subcommands for serving
//! the gateway, managing capability configuration and checking setup.

mod cli;
mod config;
mod helpers;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

use cellchat_agent::{AgentBuilder, ModelProvider, StreamingOrchestrator};
use cellchat_store::ToolStatus;
use cellchat_web::{AppState, WebServer};

use crate::cli::{Cli, Commands, LogFormat, ToolAction};
use crate::config::{AppConfig, ToolSourceKind};
use crate::helpers::{build_registry, init_tracing, load_prompts, open_tool_store};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing("info", cli.log_format);

    let result = match cli.command {
        Commands::Serve { bind, port } => cmd_serve(&cli.config, bind, port).await,
        Commands::Tools { action } => cmd_tools(&cli.config, action).await,
        Commands::Check => cmd_check(&cli.config, cli.log_format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "cellchat failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(
    config_path: &std::path::Path,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let prompts = load_prompts(&config)?;
    info!(
        agent = %prompts.agent.path().display(),
        llm = %prompts.llm.path().display(),
        "system prompts loaded"
    );

    if config.model.api_key.is_none() {
        warn!("ANTHROPIC_API_KEY is not set; every claude turn will report a configuration error");
    }

    let provider = Arc::new(ModelProvider::new(config.model_settings()));
    let builder = AgentBuilder::new(provider).with_max_turns(config.model.max_turns);
    let orchestrator = StreamingOrchestrator::new(builder);

    let (registry, tool_store) = build_registry(&config.tools).await?;
    let enabled = registry
        .resolve(true)
        .await
        .context("failed to resolve capabilities")?;
    info!(
        source = registry.source_kind(),
        enabled = ?enabled.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        "capabilities resolved"
    );

    let state = AppState {
        orchestrator,
        registry,
        tool_store,
        agent_prompt: prompts.agent,
        llm_prompt: prompts.llm,
        config: config.web_config(),
    };

    let server = WebServer::new(state);
    let addr = server.addr();
    server
        .start()
        .await
        .with_context(|| format!("web server on {addr} failed"))?;
    info!("shut down cleanly");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

async fn cmd_tools(config_path: &std::path::Path, action: ToolAction) -> Result<()> {
    let config = AppConfig::load(config_path)?;

    let (name, status) = match action {
        ToolAction::List => {
            let (registry, _) = build_registry(&config.tools).await?;
            let records = registry.records().await?;
            println!();
            println!("  {:<4} {:<16} {:<8} credentials", "id", "name", "status");
            for r in records {
                let mut set = Vec::new();
                for (field, value) in [
                    ("host", &r.host),
                    ("api_key", &r.api_key),
                    ("cse_id", &r.cse_id),
                    ("client_id", &r.client_id),
                    ("client_secret", &r.client_secret),
                    ("user_agent", &r.user_agent),
                ] {
                    if value.is_some() {
                        set.push(field);
                    }
                }
                println!(
                    "  {:<4} {:<16} {:<8} {}",
                    r.id,
                    r.name,
                    r.status.as_str(),
                    if set.is_empty() { "-".to_owned() } else { set.join(", ") }
                );
            }
            println!();
            return Ok(());
        }
        ToolAction::Enable { name } => (name, ToolStatus::Enable),
        ToolAction::Disable { name } => (name, ToolStatus::Disable),
    };

    if config.tools.source == ToolSourceKind::Env {
        bail!(
            "tool configuration comes from the environment (TOOL_CONFIG_SOURCE=env); \
             change the matching *_SEARCH_ENABLE variable instead"
        );
    }

    let store = open_tool_store(&config.tools).await?;
    let record = store
        .set_status(name.trim(), status)
        .await
        .with_context(|| format!("failed to set {name} to {status}"))?;
    println!("  {} is now {}", record.name, record.status);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

async fn cmd_check(config_path: &std::path::Path, log_format: LogFormat) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let prompts = load_prompts(&config)?;

    let (registry, _) = build_registry(&config.tools).await?;
    let enabled = registry
        .resolve(true)
        .await
        .context("failed to resolve capabilities")?;

    let mut problems = Vec::new();
    if config.model.api_key.is_none() {
        problems.push("ANTHROPIC_API_KEY is not set".to_owned());
    }
    for d in &enabled {
        let missing = d.missing_credentials();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            problems.push(format!("{} is enabled but missing {}", d.id, names.join(", ")));
        }
    }

    if log_format == LogFormat::Text {
        println!();
        println!("  config:       {}", config_path.display());
        println!("  agent prompt: {} ({} chars)", prompts.agent.path().display(), prompts.agent.text().len());
        println!("  llm prompt:   {} ({} chars)", prompts.llm.path().display(), prompts.llm.text().len());
        println!("  tools:        {} source", registry.source_kind());
        println!(
            "  enabled:      {}",
            enabled.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join(", ")
        );
        println!();
    }

    if problems.is_empty() {
        info!("configuration ok");
        return Ok(());
    }
    for p in &problems {
        warn!(problem = %p, "configuration problem");
    }
    bail!("{} configuration problem(s): {}", problems.len(), problems.join("; "))
}
