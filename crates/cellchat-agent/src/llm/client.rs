//! Anthropic Messages API client.
//!
//! Builds request bodies from [`ChatRequest`], sends them with `reqwest`
//! and decodes the SSE response lazily: bytes are only read from the socket
//! when the caller polls the returned stream, so a slow consumer throttles
//! the upstream read and dropping the stream closes the connection.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::streaming::SseParser;
use crate::llm::types::{
    ChatRequest, ContentBlock, Message, MessageContent, Role, SseEvent, ToolDefinition,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default Anthropic API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Connection and sampling settings for one Anthropic model.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub api_key: String,
    /// e.g. `https://api.anthropic.com`.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Bounds connecting and each socket read. A long answer may keep
    /// streaming past it as long as bytes keep arriving.
    pub timeout: Duration,
}

impl LlmClientConfig {
    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            model: model.into(),
            max_tokens: 2048,
            temperature: 0.7,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A streaming client for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a client. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// [`AgentError::Configuration`] when the API key is empty.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::configuration(
                "missing api key for provider: anthropic",
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.config
    }

    /// Send `request` in streaming mode and return the decoded SSE events.
    ///
    /// The HTTP request is only sent on the first poll.
    pub fn stream_events(&self, request: &ChatRequest) -> BoxStream<'static, Result<SseEvent>> {
        let body = self.build_request_body(request);
        let client = self.clone();

        Box::pin(async_stream::try_stream! {
            let resp = client.send_request(&body).await?;
            let mut parser = SseParser::new();
            let mut byte_stream = resp.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| AgentError::LlmStreamError {
                    reason: format!("stream read error: {e}"),
                })?;
                pending.extend_from_slice(&chunk);

                // Split on complete lines only; a multi-byte character may
                // straddle two chunks.
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
                    let line = std::str::from_utf8(&line_bytes).map_err(|e| {
                        AgentError::LlmStreamError {
                            reason: format!("invalid UTF-8 in stream: {e}"),
                        }
                    })?;

                    if let Some(event) = parser.parse_line(line)? {
                        let done = matches!(event, SseEvent::MessageStop);
                        yield event;
                        if done {
                            return;
                        }
                    }
                }
            }

            if !pending.is_empty() {
                let line = String::from_utf8_lossy(&pending).into_owned();
                if let Some(event) = parser.parse_line(&line)? {
                    yield event;
                }
            }
        })
    }

    // -- request building ----------------------------------------------------

    /// Build the JSON body for the Messages API.
    pub(crate) fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": messages_to_anthropic(&request.messages),
            "stream": true,
        });

        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = tools_to_anthropic(&request.tools);
        }

        body
    }

    async fn send_request(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| {
                AgentError::configuration(format!("invalid API key header: {e}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %self.config.model, "sending LLM request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::LlmRequestFailed {
                reason: format!("anthropic returned {status}: {}", upstream_message(&text)),
            });
        }

        Ok(resp)
    }
}

/// Pull the human-readable message out of an Anthropic error body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

// ===========================================================================
// Wire format conversion
// ===========================================================================

/// Convert messages to the Anthropic wire format. Tool results travel as
/// `tool_result` blocks in a user turn; consecutive results are merged into
/// one turn because the API rejects two user turns in a row.
fn messages_to_anthropic(messages: &[Message]) -> Vec<Value> {
    let mut wire: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::User => wire.push(json!({
                "role": "user",
                "content": content_to_anthropic(&msg.content),
            })),
            Role::Assistant if msg.tool_calls.is_empty() => wire.push(json!({
                "role": "assistant",
                "content": content_to_anthropic(&msg.content),
            })),
            Role::Assistant => {
                let mut content: Vec<Value> = Vec::new();
                let text = msg.content.text();
                if !text.trim().is_empty() {
                    content.push(json!({ "type": "text", "text": text }));
                }
                for tc in &msg.tool_calls {
                    content.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.arguments,
                    }));
                }
                wire.push(json!({ "role": "assistant", "content": content }));
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content.text(),
                });
                let merged = wire.last_mut().and_then(|last| {
                    let is_result_turn = last["role"] == "user"
                        && last["content"]
                            .as_array()
                            .is_some_and(|c| c.iter().all(|b| b["type"] == "tool_result"));
                    if is_result_turn {
                        last["content"].as_array_mut()
                    } else {
                        None
                    }
                });
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => wire.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }

    wire
}

fn content_to_anthropic(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Blocks(blocks) => json!(
            blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
                    ContentBlock::Image { source } => json!({ "type": "image", "source": source }),
                    ContentBlock::Document { source } => {
                        json!({ "type": "document", "source": source })
                    }
                })
                .collect::<Vec<_>>()
        ),
    }
}

fn tools_to_anthropic(tools: &[ToolDefinition]) -> Value {
    json!(
        tools
            .iter()
            .map(|t| json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            }))
            .collect::<Vec<_>>()
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{MediaSource, ToolCall};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> LlmClient {
        LlmClient::new(
            LlmClientConfig::anthropic("test-key", "claude-test").with_base_url(base_url),
        )
        .unwrap()
    }

    #[test]
    fn empty_api_key_returns_error() {
        let result = LlmClient::new(LlmClientConfig::anthropic("", "claude-test"));
        assert!(matches!(result, Err(AgentError::Configuration { .. })));
    }

    #[test]
    fn request_body_carries_fixed_sampling_settings() {
        let c = client(ANTHROPIC_BASE_URL);
        let body = c.build_request_body(&ChatRequest {
            system: Some("You are helpful.".into()),
            messages: vec![Message::user("Hello")],
            tools: vec![],
        });

        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], true);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 1e-6);
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["content"], "Hello");
    }

    #[test]
    fn request_body_forwards_content_blocks_in_order() {
        let c = client(ANTHROPIC_BASE_URL);
        let body = c.build_request_body(&ChatRequest {
            system: None,
            messages: vec![Message::user(MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: "summarise".into(),
                },
                ContentBlock::Document {
                    source: MediaSource {
                        kind: "base64".into(),
                        media_type: Some("application/pdf".into()),
                        data: Some("JVBERi0=".into()),
                        url: None,
                    },
                },
            ]))],
            tools: vec![],
        });

        let blocks = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "text");
        assert_eq!(blocks[1]["type"], "document");
        assert_eq!(blocks[1]["source"]["media_type"], "application/pdf");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn tool_results_are_merged_into_one_user_turn() {
        let calls = vec![
            ToolCall {
                id: "t1".into(),
                name: "arxiv".into(),
                arguments: json!({"query": "a"}),
            },
            ToolCall {
                id: "t2".into(),
                name: "wikipedia".into(),
                arguments: json!({"query": "b"}),
            },
        ];
        let wire = messages_to_anthropic(&[
            Message::user("q"),
            Message::assistant_tool_calls("Let me check.", calls),
            Message::tool_result("t1", "r1"),
            Message::tool_result("t2", "r2"),
        ]);

        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1]["content"][0]["type"], "text");
        assert_eq!(wire[1]["content"][1]["type"], "tool_use");
        assert_eq!(wire[1]["content"][2]["id"], "t2");
        let results = wire[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["tool_use_id"], "t2");
    }

    #[tokio::test]
    async fn stream_events_decodes_sse_body() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m1\",\"model\":\"claude-test\",\"usage\":{\"input_tokens\":3}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"4\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"stream": true, "model": "claude-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let events: Vec<SseEvent> = client(&server.uri())
            .stream_events(&ChatRequest {
                system: None,
                messages: vec![Message::user("2+2?")],
                tools: vec![],
            })
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SseEvent::MessageStart { input_tokens: 3, .. }));
        assert_eq!(
            events[1],
            SseEvent::ContentBlockDelta {
                index: 0,
                delta: crate::llm::types::SseDelta::TextDelta("4".into()),
            }
        );
        assert_eq!(events[2], SseEvent::MessageStop);
    }

    /// Serve one SSE response from a raw socket, sleeping `gap` before each
    /// frame. Returns the base URL.
    async fn paced_sse_server(frames: Vec<String>, gap: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Drain the request so closing the socket later does not reset it.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    return;
                }
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for frame in frames {
                tokio::time::sleep(gap).await;
                if socket.write_all(frame.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn delta_frame(text: &str) -> String {
        format!(
            "event: content_block_delta\ndata: {}\n\n",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})
        )
    }

    fn paced_client(base_url: &str, timeout: Duration) -> LlmClient {
        LlmClient::new(LlmClientConfig {
            timeout,
            ..LlmClientConfig::anthropic("test-key", "claude-test").with_base_url(base_url)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn answer_may_stream_longer_than_the_timeout() {
        let mut frames: Vec<String> = ["one ", "two ", "three ", "four"]
            .into_iter()
            .map(delta_frame)
            .collect();
        frames.push("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".into());
        // Five gaps of 150ms: every read is quick, the whole body is not.
        let base = paced_sse_server(frames, Duration::from_millis(150)).await;

        let events: Vec<SseEvent> = paced_client(&base, Duration::from_millis(400))
            .stream_events(&ChatRequest::default())
            .map(|e| e.unwrap())
            .collect()
            .await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                SseEvent::ContentBlockDelta {
                    delta: crate::llm::types::SseDelta::TextDelta(t),
                    ..
                } => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "one two three four");
        assert_eq!(events.last(), Some(&SseEvent::MessageStop));
    }

    #[tokio::test]
    async fn stalled_stream_still_times_out() {
        let frames = vec![delta_frame("never")];
        let base = paced_sse_server(frames, Duration::from_secs(2)).await;

        let results: Vec<Result<SseEvent>> = paced_client(&base, Duration::from_millis(200))
            .stream_events(&ChatRequest::default())
            .collect()
            .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(AgentError::LlmStreamError { .. })));
    }

    #[tokio::test]
    async fn non_success_status_surfaces_upstream_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let mut stream = client(&server.uri()).stream_events(&ChatRequest::default());
        let err = stream.next().await.unwrap().unwrap_err();
        match err {
            AgentError::LlmRequestFailed { reason } => {
                assert!(reason.contains("401"));
                assert!(reason.contains("invalid x-api-key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
