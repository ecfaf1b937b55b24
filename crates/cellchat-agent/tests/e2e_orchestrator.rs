//! End-to-end tests for the streaming orchestrator.
//!
//! A scripted in-memory model stands in for the LLM, so every turn runs the
//! real builder, reasoning loop and state machine without network access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::json;

use cellchat_agent::{
    AgentBuilder, AgentError, Capability, CapabilityDescriptor, ChatModel, ChatRequest,
    Credentials, Message, ModelEvent, ModelKind, ModelProvider, ModelSettings, Result, SENTINEL,
    StreamingOrchestrator, ToolCall, TurnRequest,
};

// ── fixtures ──────────────────────────────────────────────────────────────────

/// One scripted model call: events to play, optionally followed by an error.
#[derive(Clone, Default)]
struct Script {
    events: Vec<ModelEvent>,
    fail_with: Option<String>,
}

impl Script {
    fn events(events: Vec<ModelEvent>) -> Self {
        Self {
            events,
            fail_with: None,
        }
    }
}

struct ScriptedModel {
    scripts: Mutex<Vec<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(mut scripts: Vec<Script>) -> Arc<Self> {
        scripts.reverse();
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn stream(&self, request: ChatRequest) -> BoxStream<'static, Result<ModelEvent>> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop().unwrap_or_default();
        let mut items: Vec<Result<ModelEvent>> = script.events.into_iter().map(Ok).collect();
        if let Some(reason) = script.fail_with {
            items.push(Err(AgentError::LlmStreamError { reason }));
        }
        futures::stream::iter(items).boxed()
    }
}

/// Always fails, as if the upstream API were unreachable.
struct FlakySearch;

#[async_trait]
impl Capability for FlakySearch {
    fn id(&self) -> &str {
        "duckduckgo"
    }
    fn name(&self) -> &str {
        "DuckDuckGo"
    }
    fn description(&self) -> &str {
        "Web search."
    }
    async fn search(&self, _query: &str, _credentials: &Credentials) -> Result<String> {
        Err(AgentError::ToolExecution {
            capability: "duckduckgo".into(),
            reason: "connection refused".into(),
        })
    }
}

fn text(t: &str) -> ModelEvent {
    ModelEvent::TextDelta(t.into())
}

fn finished() -> ModelEvent {
    ModelEvent::Finished {
        stop_reason: Some("end_turn".into()),
    }
}

fn tool_call(id: &str, name: &str, query: &str) -> ModelEvent {
    ModelEvent::ToolCall(ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: json!({ "query": query }),
    })
}

async fn orchestrator_with(model: Arc<ScriptedModel>) -> StreamingOrchestrator {
    let provider = Arc::new(ModelProvider::new(ModelSettings::default()));
    provider.register(ModelKind::Claude, model).await;
    StreamingOrchestrator::new(AgentBuilder::new(provider))
}

fn turn(model_name: &str, content: &str) -> TurnRequest {
    TurnRequest::new(model_name, "You are helpful.", vec![Message::user(content)])
}

async fn collect(orch: &StreamingOrchestrator, request: TurnRequest) -> Vec<String> {
    orch.stream_turn(request).unwrap().collect().await
}

// ── normal runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_answer_streams_tokens_then_sentinel() {
    let model = ScriptedModel::new(vec![Script::events(vec![
        text("2 + 2"),
        text(" = 4"),
        finished(),
    ])]);
    let orch = orchestrator_with(model).await;

    let chunks = collect(&orch, turn("claude", "2+2?")).await;

    assert_eq!(chunks, vec!["2 + 2", " = 4", SENTINEL]);
}

#[tokio::test]
async fn concatenation_reproduces_model_text_in_order() {
    let parts = ["The ", "answer ", "is ", "forty", "-two."];
    let mut events: Vec<ModelEvent> = parts.iter().map(|p| text(p)).collect();
    events.push(finished());
    let orch = orchestrator_with(ScriptedModel::new(vec![Script::events(events)])).await;

    let chunks = collect(&orch, turn("claude", "meaning?")).await;

    let (last, body) = chunks.split_last().unwrap();
    assert_eq!(last, SENTINEL);
    assert_eq!(body.concat(), parts.concat());
    assert_eq!(chunks.iter().filter(|c| c.as_str() == SENTINEL).count(), 1);
}

#[tokio::test]
async fn whitespace_only_segments_are_dropped() {
    let orch = orchestrator_with(ScriptedModel::new(vec![Script::events(vec![
        text("  "),
        text("Hi"),
        text("\n\n"),
        text("\t"),
        finished(),
    ])]))
    .await;

    let chunks = collect(&orch, turn("claude", "hello")).await;

    assert_eq!(chunks, vec!["Hi", SENTINEL]);
}

#[tokio::test]
async fn visible_segments_keep_their_edge_whitespace() {
    let orch = orchestrator_with(ScriptedModel::new(vec![Script::events(vec![
        text("First paragraph.\n\n"),
        text("\n\n"),
        text(" Second one."),
        finished(),
    ])]))
    .await;

    let chunks = collect(&orch, turn("claude", "hello")).await;

    // A standalone paragraph break is dropped; one riding on text is not.
    assert_eq!(chunks, vec!["First paragraph.\n\n", " Second one.", SENTINEL]);
    assert_eq!(chunks[..2].concat(), "First paragraph.\n\n Second one.");
}

#[tokio::test]
async fn only_whitespace_output_yields_just_the_sentinel() {
    let orch = orchestrator_with(ScriptedModel::new(vec![Script::events(vec![
        text(" "),
        text(" "),
        finished(),
    ])]))
    .await;

    let chunks = collect(&orch, turn("claude", "hello")).await;

    assert_eq!(chunks, vec![SENTINEL]);
}

#[tokio::test]
async fn model_name_is_case_insensitive() {
    let orch = orchestrator_with(ScriptedModel::new(vec![Script::events(vec![
        text("ok"),
        finished(),
    ])]))
    .await;

    let chunks = collect(&orch, turn("CLAUDE", "hello")).await;

    assert_eq!(chunks, vec!["ok", SENTINEL]);
}

// ── tool chatter ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_capability_does_not_abort_turn_or_leak() {
    let model = ScriptedModel::new(vec![
        Script::events(vec![
            text("Let me search."),
            tool_call("t1", "duckduckgo", "rust 2024 edition"),
            ModelEvent::Finished {
                stop_reason: Some("tool_use".into()),
            },
        ]),
        Script::events(vec![
            text("Search is down, but the 2024 edition shipped with Rust 1.85."),
            finished(),
        ]),
    ]);
    let orch = orchestrator_with(Arc::clone(&model)).await;

    let request = turn("claude", "When did the 2024 edition ship?").with_capabilities(vec![
        CapabilityDescriptor::new(Arc::new(FlakySearch), true, Credentials::default()),
    ]);
    let chunks = collect(&orch, request).await;

    assert_eq!(
        chunks,
        vec![
            "Let me search.",
            "Search is down, but the 2024 edition shipped with Rust 1.85.",
            SENTINEL,
        ]
    );
    assert!(chunks.iter().all(|c| !c.contains("connection refused")));

    // The failure text went back to the model instead.
    let requests = model.requests.lock().unwrap();
    let tool_message = requests[1].messages.last().unwrap();
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("t1"));
    assert!(tool_message.content.text().contains("connection refused"));
}

#[tokio::test]
async fn capabilities_are_advertised_to_the_model() {
    let model = ScriptedModel::new(vec![Script::events(vec![text("hi"), finished()])]);
    let orch = orchestrator_with(Arc::clone(&model)).await;

    let request = turn("claude", "hello").with_capabilities(vec![CapabilityDescriptor::new(
        Arc::new(FlakySearch),
        true,
        Credentials::default(),
    )]);
    collect(&orch, request).await;

    let requests = model.requests.lock().unwrap();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "duckduckgo");
    assert_eq!(requests[0].system.as_deref(), Some("You are helpful."));
}

// ── rejection and degradation ─────────────────────────────────────────────────

#[tokio::test]
async fn empty_history_is_rejected_before_streaming() {
    let model = ScriptedModel::new(vec![]);
    let orch = orchestrator_with(Arc::clone(&model)).await;

    let err = orch
        .stream_turn(TurnRequest::new("claude", "p", vec![]))
        .err()
        .unwrap();

    assert!(matches!(err, AgentError::Validation { .. }));
    assert_eq!(err.to_string(), "No messages provided");
    assert_eq!(model.request_count(), 0);
}

#[tokio::test]
async fn unavailable_model_emits_single_notice() {
    let orch = orchestrator_with(ScriptedModel::new(vec![])).await;

    let chunks = collect(&orch, turn("Llama", "hello")).await;

    assert_eq!(chunks, vec!["Model llama not found."]);
}

#[tokio::test]
async fn unsupported_model_reaching_orchestrator_is_in_band_error() {
    let orch = orchestrator_with(ScriptedModel::new(vec![])).await;

    let chunks = collect(&orch, turn("mistral", "hello")).await;

    assert_eq!(chunks, vec!["[Error] Unsupported model: mistral"]);
}

// ── faults ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fault_mid_stream_ends_with_error_chunk_and_no_sentinel() {
    let orch = orchestrator_with(ScriptedModel::new(vec![Script {
        events: vec![text("Partial")],
        fail_with: Some("connection reset".into()),
    }]))
    .await;

    let chunks = collect(&orch, turn("claude", "hello")).await;

    assert_eq!(
        chunks,
        vec!["Partial", "[Error] llm stream error: connection reset"]
    );
    assert!(!chunks.iter().any(|c| c == SENTINEL));
}

#[tokio::test]
async fn fault_before_any_token_is_single_error_chunk() {
    let orch = orchestrator_with(ScriptedModel::new(vec![Script {
        events: vec![],
        fail_with: Some("overloaded".into()),
    }]))
    .await;

    let chunks = collect(&orch, turn("claude", "hello")).await;

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].starts_with("[Error] "));
}

#[tokio::test]
async fn dropping_the_stream_stops_pulling_events() {
    let model = ScriptedModel::new(vec![
        Script::events(vec![
            text("first"),
            tool_call("t1", "duckduckgo", "q"),
            finished(),
        ]),
        Script::events(vec![text("second"), finished()]),
    ]);
    let orch = orchestrator_with(Arc::clone(&model)).await;
    let request = turn("claude", "hello").with_capabilities(vec![CapabilityDescriptor::new(
        Arc::new(FlakySearch),
        true,
        Credentials::default(),
    )]);

    let mut stream = orch.stream_turn(request).unwrap();
    assert_eq!(stream.next().await.as_deref(), Some("first"));
    drop(stream);

    assert_eq!(model.request_count(), 1);
}
