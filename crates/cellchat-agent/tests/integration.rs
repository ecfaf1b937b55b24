//! Integration tests for the cellchat-agent crate.
//!
//! These run whole turns against a fake Anthropic endpoint served by
//! `wiremock`, covering the HTTP client, SSE decoding, the binding cache
//! and the orchestrator together.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cellchat_agent::{
    AgentBuilder, Message, ModelProvider, ModelSettings, SENTINEL, StreamingOrchestrator,
    TurnRequest,
};

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

fn sse_text_answer(parts: &[&str]) -> String {
    let mut body = String::from(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4-20250514\",\"usage\":{\"input_tokens\":12}}}\n\n\
         event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    );
    for part in parts {
        let data = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": part}
        });
        body.push_str(&format!("event: content_block_delta\ndata: {data}\n\n"));
    }
    body.push_str(
        "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n\
         event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":3}}\n\n\
         event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    );
    body
}

fn orchestrator(base_url: &str) -> StreamingOrchestrator {
    let provider = ModelProvider::new(ModelSettings {
        api_key: "sk-test".into(),
        base_url: base_url.into(),
        claude_model_id: "claude-sonnet-4-20250514".into(),
        max_tokens: 512,
        temperature: 0.2,
        ..ModelSettings::default()
    });
    StreamingOrchestrator::new(AgentBuilder::new(Arc::new(provider)))
}

// ═══════════════════════════════════════════════════════════════════════
//  Turns against a fake Anthropic API
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn claude_turn_streams_answer_and_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 512,
            "system": "Answer tersely.",
            "stream": true,
            "messages": [{"role": "user", "content": "2+2?"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_text_answer(&["2+2", " is 4."]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let chunks: Vec<String> = orchestrator(&server.uri())
        .stream_turn(TurnRequest::new(
            "claude",
            "Answer tersely.",
            vec![Message::user("2+2?")],
        ))
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks, vec!["2+2", " is 4.", SENTINEL]);
}

#[tokio::test]
async fn upstream_rejection_becomes_in_band_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let chunks: Vec<String> = orchestrator(&server.uri())
        .stream_turn(TurnRequest::new("claude", "p", vec![Message::user("hi")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].starts_with("[Error] llm request failed:"));
    assert!(chunks[0].contains("Overloaded"));
}

#[tokio::test]
async fn building_a_turn_sends_nothing_until_polled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_text_answer(&["x"]), "text/event-stream"))
        .expect(0)
        .mount(&server)
        .await;

    let stream = orchestrator(&server.uri())
        .stream_turn(TurnRequest::new("claude", "p", vec![Message::user("hi")]))
        .unwrap();
    drop(stream);

    server.verify().await;
}

#[tokio::test]
async fn missing_api_key_is_reported_in_band() {
    let provider = ModelProvider::new(ModelSettings::default());
    let orch = StreamingOrchestrator::new(AgentBuilder::new(Arc::new(provider)));

    let chunks: Vec<String> = orch
        .stream_turn(TurnRequest::new("claude", "p", vec![Message::user("hi")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        chunks,
        vec!["[Error] configuration error: missing api key for provider: anthropic"]
    );
}
