//! Agent runtime for cellchat.
//!
//! Turns a conversation into a stream of user-visible text, optionally
//! calling external capabilities along the way.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌────────────────┐
//! │ Orchestrator │───>│ AgentBuilder │───>│ ModelProvider  │
//! │ (turn state) │    │ (wiring)     │    │ (bind + cache) │
//! └──────┬───────┘    └──────────────┘    └───────┬────────┘
//!        │                                        │
//!        └──── reasoning loop ────┐        ┌──────┴──────┐
//!                  │              │        │ LLM client  │
//!           ┌──────┴──────┐       └───────>│ (Anthropic) │
//!           │ Capabilities│                └─────────────┘
//!           └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Wire types, SSE parsing and the Anthropic client.
//! - [`model`] -- Model names, the provider and its binding cache.
//! - [`capability`] -- The capability contract and descriptors.
//! - [`builder`] -- Agent construction.
//! - [`runtime`] -- The reasoning loop and its events.
//! - [`orchestrator`] -- Turn state machine producing output chunks.
//! - [`prompt`] -- System prompt loading.
//! - [`error`] -- Agent error types.

pub mod builder;
pub mod capability;
pub mod error;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod runtime;

pub use builder::{AgentBinding, AgentBuilder, AgentHandle};
pub use capability::{Capability, CapabilityDescriptor, CredentialField, Credentials};
pub use error::{AgentError, Result};
pub use llm::{
    ChatRequest, ContentBlock, LlmClient, LlmClientConfig, MediaSource, Message, MessageContent,
    Role, ToolCall, ToolDefinition,
};
pub use model::{ChatModel, ClaudeModel, ModelBinding, ModelEvent, ModelKind, ModelProvider, ModelSettings};
pub use orchestrator::{
    Emit, SENTINEL, StreamingOrchestrator, TurnContext, TurnRequest, TurnState, classify,
    fault_chunk,
};
pub use prompt::SystemPrompt;
pub use runtime::{DEFAULT_MAX_TURNS, LoopConfig, Node, StreamEvent, reasoning_loop};
