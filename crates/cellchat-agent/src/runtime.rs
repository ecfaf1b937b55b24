//! Reasoning loop.
//!
//! Alternates model calls with capability calls until the model answers
//! without requesting tools. Everything the loop does is reported as a
//! [`StreamEvent`]; the loop is a lazy stream, so nothing runs until the
//! caller polls and dropping the stream cancels any in-flight model or
//! capability request.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream::BoxStream;
use serde_json::Value;
use uuid::Uuid;

use crate::capability::CapabilityDescriptor;
use crate::error::{AgentError, Result};
use crate::llm::types::{ChatRequest, Message, ToolCall};
use crate::model::{ChatModel, ModelEvent};

/// Default cap on model calls per turn.
pub const DEFAULT_MAX_TURNS: u32 = 10;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The step of the loop that produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Text generated by the model.
    Model,
    /// Output of capability execution.
    Tools,
}

/// One event of the reasoning loop.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token { text: String, node: Node },
    ToolInvocation { id: String, name: String, query: String },
    ToolResult { id: String, name: String, content: String },
    /// The model answered without tool calls; no more events follow.
    Terminal { stop_reason: Option<String> },
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Everything one run of the loop needs.
#[derive(Clone)]
pub struct LoopConfig {
    pub model: Arc<dyn ChatModel>,
    pub system_prompt: String,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub max_turns: u32,
}

/// Run the reasoning loop over `messages`.
pub fn reasoning_loop(
    config: LoopConfig,
    messages: Vec<Message>,
) -> BoxStream<'static, Result<StreamEvent>> {
    Box::pin(async_stream::try_stream! {
        let run_id = Uuid::now_v7();
        let LoopConfig { model, system_prompt, capabilities, max_turns } = config;
        let tools: Vec<_> = capabilities.iter().map(|c| c.tool_definition()).collect();
        let mut history = messages;

        tracing::info!(
            run_id = %run_id,
            model = %model.name(),
            max_turns,
            tool_count = tools.len(),
            "starting reasoning loop"
        );

        for turn in 0..max_turns {
            tracing::debug!(run_id = %run_id, turn, "model call");

            let request = ChatRequest {
                system: Some(system_prompt.clone()),
                messages: history.clone(),
                tools: tools.clone(),
            };

            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut stop_reason = None;

            let mut events = model.stream(request);
            while let Some(event) = events.next().await {
                match event? {
                    ModelEvent::TextDelta(delta) => {
                        text.push_str(&delta);
                        yield StreamEvent::Token { text: delta, node: Node::Model };
                    }
                    ModelEvent::ToolCall(call) => calls.push(call),
                    ModelEvent::Finished { stop_reason: reason } => stop_reason = reason,
                }
            }

            if calls.is_empty() {
                tracing::info!(run_id = %run_id, turns = turn + 1, "reasoning loop finished");
                yield StreamEvent::Terminal { stop_reason };
                return;
            }

            tracing::info!(
                run_id = %run_id,
                turn,
                tools = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                "model requested tool calls"
            );

            history.push(Message::assistant_tool_calls(text, calls.clone()));

            for call in &calls {
                yield StreamEvent::ToolInvocation {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    query: query_of(&call.arguments),
                };
            }

            let results = execute_tool_calls(&capabilities, &calls).await;

            for (call, content) in calls.iter().zip(results) {
                yield StreamEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    content: content.clone(),
                };
                yield StreamEvent::Token { text: content.clone(), node: Node::Tools };
                history.push(Message::tool_result(&call.id, content));
            }
        }

        Err::<(), AgentError>(AgentError::stream(format!(
            "agent stopped after {max_turns} model calls without a final answer"
        )))?;
    })
}

/// Run every call concurrently within the current task and return the result
/// strings in call order.
async fn execute_tool_calls(capabilities: &[CapabilityDescriptor], calls: &[ToolCall]) -> Vec<String> {
    join_all(calls.iter().map(|call| async move {
        match capabilities.iter().find(|c| c.id == call.name) {
            Some(capability) => capability.run(&query_of(&call.arguments)).await,
            None => {
                tracing::warn!(tool = %call.name, "model requested unknown tool");
                format!("Error: unknown tool {}", call.name)
            }
        }
    }))
    .await
}

/// Extract the query string from tool-call arguments.
fn query_of(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("query") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => arguments.to_string(),
        },
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
