//! CLI argument definitions for cellchat.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// cellchat -- a streaming chat gateway for tool-using agents.
#[derive(Parser)]
#[command(
    name = "cellchat",
    version,
    about = "cellchat -- streaming chat gateway for tool-using agents",
    long_about = "Serves chat completions over HTTP. Each turn runs an agent that may call \
                  search, news and weather tools before answering, and streams the answer \
                  back as plain text."
)]
pub struct Cli {
    /// Configuration file. A missing file means defaults plus environment.
    #[arg(long, global = true, default_value = "config/cellchat.toml")]
    pub config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Inspect or change capability configuration.
    Tools {
        #[command(subcommand)]
        action: ToolAction,
    },

    /// Validate configuration and prompts without serving.
    Check,
}

/// Actions for managing capability configuration.
#[derive(Subcommand)]
pub enum ToolAction {
    /// List every capability and its status.
    List,
    /// Enable a capability.
    Enable {
        /// Capability name, e.g. `google_search`.
        name: String,
    },
    /// Disable a capability.
    Disable {
        /// Capability name, e.g. `arxiv`.
        name: String,
    },
}
