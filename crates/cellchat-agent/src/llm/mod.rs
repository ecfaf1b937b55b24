//! LLM integration layer.
//!
//! - [`types`] -- Provider-agnostic messages, tool calls and SSE events.
//! - [`client`] -- Streaming HTTP client for the Anthropic Messages API.
//! - [`streaming`] -- SSE line parser.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::{LlmClient, LlmClientConfig};
pub use types::{
    ChatRequest, ContentBlock, MediaSource, Message, MessageContent, Role, ToolCall,
    ToolDefinition,
};
