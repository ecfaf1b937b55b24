//! Model Provider.
//!
//! Turns a caller-supplied model name into a streaming [`ChatModel`]. The
//! set of names is closed ([`ModelKind`]); names that are recognised but have
//! no backend bind to [`ModelBinding::Unavailable`] instead of failing, so the
//! orchestrator can answer with an in-band notice.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use moka::future::Cache;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::client::{ANTHROPIC_BASE_URL, LlmClient, LlmClientConfig};
use crate::llm::types::{ChatRequest, SseDelta, SseEvent, ToolCall};

// ---------------------------------------------------------------------------
// Model kinds
// ---------------------------------------------------------------------------

/// Every model name the gateway knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Claude,
    Llama,
    GptOss,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [Self::Claude, Self::Llama, Self::GptOss];

    /// Wire name, as accepted in `model_name`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Llama => "llama",
            Self::GptOss => "gpt-oss",
        }
    }

    /// Whether a backend is wired for this kind.
    pub fn is_implemented(self) -> bool {
        matches!(self, Self::Claude)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| AgentError::UnsupportedModel {
                model: s.trim().to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Fixed per-process model configuration, applied at bind time.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_key: String,
    pub base_url: String,
    /// Concrete Anthropic model id behind the `claude` name.
    pub claude_model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Idle limit for the model connection.
    pub request_timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            claude_model_id: "claude-sonnet-4-20250514".to_owned(),
            max_tokens: 2048,
            temperature: 0.7,
            request_timeout: Duration::from_secs(120),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat model contract
// ---------------------------------------------------------------------------

/// One step of a model's streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    /// A complete tool call; emitted once its input JSON is fully received.
    ToolCall(ToolCall),
    Finished { stop_reason: Option<String> },
}

/// A bound, streaming language model.
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// Stream one model call. Nothing is sent until the stream is polled.
    fn stream(&self, request: ChatRequest) -> BoxStream<'static, Result<ModelEvent>>;
}

// ---------------------------------------------------------------------------
// Claude
// ---------------------------------------------------------------------------

/// Claude over the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeModel {
    client: LlmClient,
}

impl ClaudeModel {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let config = LlmClientConfig {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model: settings.claude_model_id.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.request_timeout,
        };
        Ok(Self {
            client: LlmClient::new(config)?,
        })
    }
}

/// A tool-use block being assembled from `input_json_delta` fragments.
#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    input_json: String,
}

impl ToolCallBuilder {
    fn finish(self) -> Result<ToolCall> {
        let arguments = if self.input_json.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&self.input_json).map_err(|e| AgentError::LlmParseFailed {
                reason: format!("invalid tool input for {}: {e}", self.name),
            })?
        };
        Ok(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

impl ChatModel for ClaudeModel {
    fn name(&self) -> &str {
        &self.client.config().model
    }

    fn stream(&self, request: ChatRequest) -> BoxStream<'static, Result<ModelEvent>> {
        let mut events = self.client.stream_events(&request);

        Box::pin(async_stream::try_stream! {
            let mut tool_blocks: HashMap<u32, ToolCallBuilder> = HashMap::new();
            let mut stop_reason: Option<String> = None;

            while let Some(event) = events.next().await {
                match event? {
                    SseEvent::MessageStart { message_id, input_tokens, .. } => {
                        tracing::debug!(message_id = %message_id, input_tokens, "model stream started");
                    }
                    SseEvent::ContentBlockStart { index, content_type, id, name } => {
                        if content_type == "tool_use" {
                            tool_blocks.insert(index, ToolCallBuilder {
                                id: id.unwrap_or_default(),
                                name: name.unwrap_or_default(),
                                input_json: String::new(),
                            });
                        }
                    }
                    SseEvent::ContentBlockDelta { index, delta } => match delta {
                        SseDelta::TextDelta(text) => {
                            if !text.is_empty() {
                                yield ModelEvent::TextDelta(text);
                            }
                        }
                        SseDelta::InputJsonDelta(fragment) => {
                            if let Some(builder) = tool_blocks.get_mut(&index) {
                                builder.input_json.push_str(&fragment);
                            }
                        }
                    },
                    SseEvent::ContentBlockStop { index } => {
                        if let Some(builder) = tool_blocks.remove(&index) {
                            yield ModelEvent::ToolCall(builder.finish()?);
                        }
                    }
                    SseEvent::MessageDelta { stop_reason: reason, output_tokens } => {
                        tracing::debug!(output_tokens, stop_reason = ?reason, "model stream delta");
                        stop_reason = reason;
                    }
                    SseEvent::MessageStop => break,
                    SseEvent::Ping => {}
                    SseEvent::Error { kind, message } => {
                        Err::<(), AgentError>(AgentError::LlmStreamError {
                            reason: format!("{kind}: {message}"),
                        })?;
                    }
                }
            }

            yield ModelEvent::Finished { stop_reason };
        })
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Outcome of binding a model name.
#[derive(Clone)]
pub enum ModelBinding {
    Ready(Arc<dyn ChatModel>),
    /// Recognised name without a backend.
    Unavailable(ModelKind),
}

impl fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(m) => f.debug_tuple("Ready").field(&m.name()).finish(),
            Self::Unavailable(k) => f.debug_tuple("Unavailable").field(k).finish(),
        }
    }
}

/// Binds model names to chat models and caches the bound handles.
pub struct ModelProvider {
    settings: ModelSettings,
    bindings: Cache<ModelKind, Arc<dyn ChatModel>>,
}

impl ModelProvider {
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            settings,
            bindings: Cache::builder()
                .max_capacity(ModelKind::ALL.len() as u64)
                .build(),
        }
    }

    /// Install a model for `kind`, replacing the built-in backend.
    pub async fn register(&self, kind: ModelKind, model: Arc<dyn ChatModel>) {
        self.bindings.insert(kind, model).await;
    }

    /// Bind `name` to a model. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// [`AgentError::UnsupportedModel`] for names outside [`ModelKind`], and
    /// [`AgentError::Configuration`] when the Claude backend cannot be built.
    pub async fn bind(&self, name: &str) -> Result<ModelBinding> {
        let kind: ModelKind = name.parse()?;

        if let Some(model) = self.bindings.get(&kind).await {
            return Ok(ModelBinding::Ready(model));
        }

        if !kind.is_implemented() {
            tracing::debug!(model = %kind, "model recognised but not available");
            return Ok(ModelBinding::Unavailable(kind));
        }

        let model: Arc<dyn ChatModel> = Arc::new(ClaudeModel::new(&self.settings)?);
        self.bindings.insert(kind, Arc::clone(&model)).await;
        tracing::info!(model = %kind, model_id = %model.name(), "model bound");
        Ok(ModelBinding::Ready(model))
    }
}

impl fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProvider")
            .field("claude_model_id", &self.settings.claude_model_id)
            .field("bound", &self.bindings.entry_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
