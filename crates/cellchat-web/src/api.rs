//! Chat completion route handlers.
//!
//! Both completion routes share one pipeline: validate the body, pick the
//! capability snapshot, hand the turn to the orchestrator and stream its
//! chunks back as they arrive.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use cellchat_agent::{Message, MessageContent, ModelKind, SystemPrompt, TurnRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// Model used when the request does not name one.
pub const DEFAULT_MODEL: &str = "claude";

// ---------------------------------------------------------------------------
// Request body
// ---------------------------------------------------------------------------

/// Body of both completion routes.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionBody {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub chat_session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// Roles a caller may send. Tool turns are internal to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundRole {
    User,
    Assistant,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub role: InboundRole,
    pub content: MessageContent,
}

impl From<InboundMessage> for Message {
    fn from(m: InboundMessage) -> Self {
        match m.role {
            InboundRole::User => Message::user(m.content),
            InboundRole::Assistant => Message::assistant(m.content),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
///
/// Touches the SQLite file when one backs the tool routes. An unreachable
/// store answers 503 so a supervisor can restart the process.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let Some(store) = &state.tool_store else {
        return Json(json!({ "status": "ok", "store": "none" })).into_response();
    };

    match store.schema_version().await {
        Ok(version) => Json(json!({
            "status": "ok",
            "store": "ok",
            "schema_version": version,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "store": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// POST /{v}/chat/agent/completions
pub async fn agent_completions(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatCompletionBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    stream_completion(&state, body, &state.agent_prompt, true).await
}

/// POST /{v}/chat/llm/completions
pub async fn llm_completions(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatCompletionBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    stream_completion(&state, body, &state.llm_prompt, false).await
}

async fn stream_completion(
    state: &AppState,
    body: ChatCompletionBody,
    prompt: &SystemPrompt,
    with_tools: bool,
) -> Result<Response, ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::BadRequest("No messages provided".into()));
    }

    let model_name = body
        .model_name
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_owned());
    // Unknown names are rejected here; known-but-unwired ones get the
    // in-band notice from the orchestrator.
    model_name.parse::<ModelKind>()?;

    let capabilities = if with_tools {
        state.registry.resolve(true).await?
    } else {
        Vec::new()
    };

    let messages: Vec<Message> = body.messages.into_iter().map(Message::from).collect();
    let request = TurnRequest::new(model_name, prompt.text(), messages)
        .with_session(body.chat_session_id)
        .with_capabilities(capabilities);

    tracing::info!(
        turn_id = %request.turn_id,
        chat_session_id = request.chat_session_id.as_deref().unwrap_or(""),
        model = %request.model_name,
        messages = request.messages.len(),
        tools = request.capabilities.len(),
        "chat turn accepted"
    );

    let chunks = state.orchestrator.stream_turn(request)?;
    Ok(streaming_response(Body::from_stream(chunks.map(Ok::<_, Infallible>))))
}

fn streaming_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_accepts_text_and_block_content() {
        let body: ChatCompletionBody = serde_json::from_value(json!({
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": [{"type": "text", "text": "hello"}]}
            ]
        }))
        .unwrap();

        assert_eq!(body.model_name, None);
        let messages: Vec<Message> = body.messages.into_iter().map(Message::from).collect();
        assert_eq!(messages[0], Message::user("hi"));
        assert_eq!(messages[1].content.text(), "hello");
    }

    #[test]
    fn tool_role_is_not_accepted_from_callers() {
        let parsed: Result<ChatCompletionBody, _> = serde_json::from_value(json!({
            "messages": [{"role": "tool", "content": "x"}]
        }));
        assert!(parsed.is_err());
    }
}
