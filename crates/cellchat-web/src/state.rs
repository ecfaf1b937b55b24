//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers. Everything in it is either immutable after startup or safe for
//! concurrent use, so handlers never take a lock.

use cellchat_agent::{StreamingOrchestrator, SystemPrompt};
use cellchat_store::ToolConfigStore;
use cellchat_tools::ToolRegistry;

use crate::WebConfig;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Runs streamed turns.
    pub orchestrator: StreamingOrchestrator,

    /// Capability catalog joined with the active configuration source.
    pub registry: ToolRegistry,

    /// Writable configuration store. `None` when tools come from the
    /// environment, which makes the tool mutation routes read-only.
    pub tool_store: Option<ToolConfigStore>,

    /// System prompt of the agent route.
    pub agent_prompt: SystemPrompt,

    /// System prompt of the tool-free route.
    pub llm_prompt: SystemPrompt,

    /// Web server configuration.
    pub config: WebConfig,
}
