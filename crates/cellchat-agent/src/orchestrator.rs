//! Streaming orchestrator.
//!
//! Drives one chat turn: binds the agent, pulls reasoning-loop events one at
//! a time and turns them into user-visible text chunks. The turn moves
//! through explicit [`TurnState`]s; every fault, wherever it happens, goes
//! through [`fault_chunk`] and ends the stream with a single
//! `"[Error] ..."` chunk.

use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::builder::{AgentBinding, AgentBuilder};
use crate::capability::CapabilityDescriptor;
use crate::error::{AgentError, Result};
use crate::llm::types::Message;
use crate::runtime::{Node, StreamEvent};

/// Trailing chunk that marks the end of a successful turn.
pub const SENTINEL: &str = "\n";

// ---------------------------------------------------------------------------
// Turn request
// ---------------------------------------------------------------------------

/// Everything needed to run one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub turn_id: Uuid,
    pub model_name: String,
    pub chat_session_id: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    /// Capability snapshot the agent is built with.
    pub capabilities: Vec<CapabilityDescriptor>,
}

impl TurnRequest {
    pub fn new(
        model_name: impl Into<String>,
        system_prompt: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            turn_id: Uuid::now_v7(),
            model_name: model_name.into(),
            chat_session_id: None,
            system_prompt: system_prompt.into(),
            messages,
            capabilities: Vec::new(),
        }
    }

    pub fn with_session(mut self, chat_session_id: Option<String>) -> Self {
        self.chat_session_id = chat_session_id;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<CapabilityDescriptor>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Binding,
    Looping,
    Draining,
    Terminated,
    Errored,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Binding => "binding",
            Self::Looping => "looping",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
            Self::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

/// What a reasoning-loop event produces on the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    Chunk(String),
    Skip,
}

/// Decide whether `event` reaches the user.
///
/// Only model-generated tokens with non-blank text are emitted; tool tokens,
/// invocations, results and the terminal marker are consumed.
pub fn classify(event: &StreamEvent) -> Emit {
    match event {
        StreamEvent::Token {
            text,
            node: Node::Model,
        } if !text.trim().is_empty() => Emit::Chunk(text.clone()),
        StreamEvent::Token { .. }
        | StreamEvent::ToolInvocation { .. }
        | StreamEvent::ToolResult { .. }
        | StreamEvent::Terminal { .. } => Emit::Skip,
    }
}

/// Correlation fields attached to every log line of a turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub turn_id: Uuid,
    pub chat_session_id: Option<String>,
    pub model_name: String,
}

/// Log `err` with full detail and render the in-band error chunk.
pub fn fault_chunk(ctx: &TurnContext, err: &AgentError) -> String {
    error!(
        turn_id = %ctx.turn_id,
        chat_session_id = ctx.chat_session_id.as_deref().unwrap_or("-"),
        model = %ctx.model_name,
        error = ?err,
        "turn failed: {err}"
    );
    format!("[Error] {err}")
}

/// Tracks the state of one turn and logs transitions.
struct Turn {
    ctx: TurnContext,
    state: TurnState,
}

impl Turn {
    fn advance(&mut self, next: TurnState) {
        debug!(turn_id = %self.ctx.turn_id, from = %self.state, to = %next, "turn state");
        self.state = next;
    }

    fn fail(&mut self, err: &AgentError) -> String {
        self.advance(TurnState::Errored);
        fault_chunk(&self.ctx, err)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs chat turns as lazy streams of text chunks.
#[derive(Debug, Clone)]
pub struct StreamingOrchestrator {
    builder: AgentBuilder,
}

impl StreamingOrchestrator {
    pub fn new(builder: AgentBuilder) -> Self {
        Self { builder }
    }

    /// Start a turn.
    ///
    /// The returned stream does nothing until polled. A successful turn ends
    /// with exactly one [`SENTINEL`] chunk; a failed one ends with a single
    /// error chunk instead.
    ///
    /// # Errors
    ///
    /// [`AgentError::Validation`] when the history is empty. No other error
    /// is returned; everything after this point is reported in-band.
    pub fn stream_turn(&self, request: TurnRequest) -> Result<BoxStream<'static, String>> {
        if request.messages.is_empty() {
            return Err(AgentError::validation("No messages provided"));
        }

        let builder = self.builder.clone();
        let TurnRequest {
            turn_id,
            model_name,
            chat_session_id,
            system_prompt,
            messages,
            capabilities,
        } = request;

        let mut turn = Turn {
            ctx: TurnContext {
                turn_id,
                chat_session_id,
                model_name,
            },
            state: TurnState::Idle,
        };

        Ok(Box::pin(async_stream::stream! {
            info!(
                turn_id = %turn.ctx.turn_id,
                chat_session_id = turn.ctx.chat_session_id.as_deref().unwrap_or("-"),
                model = %turn.ctx.model_name,
                messages = messages.len(),
                capabilities = capabilities.len(),
                "turn started"
            );

            turn.advance(TurnState::Binding);
            let handle = match builder
                .build(&turn.ctx.model_name, &system_prompt, capabilities)
                .await
            {
                Ok(AgentBinding::Ready(handle)) => handle,
                Ok(AgentBinding::Unavailable(_)) => {
                    turn.advance(TurnState::Errored);
                    yield format!("Model {} not found.", turn.ctx.model_name.trim().to_lowercase());
                    return;
                }
                Err(e) => {
                    yield turn.fail(&e);
                    return;
                }
            };

            turn.advance(TurnState::Looping);
            let mut events = handle.run(messages);
            let mut emitted = 0usize;

            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if let Emit::Chunk(text) = classify(&event) {
                            emitted += 1;
                            yield text;
                        }
                    }
                    Err(e) => {
                        yield turn.fail(&e);
                        return;
                    }
                }
            }

            turn.advance(TurnState::Draining);
            yield SENTINEL.to_owned();
            turn.advance(TurnState::Terminated);
            info!(turn_id = %turn.ctx.turn_id, chunks = emitted, "turn completed");
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
