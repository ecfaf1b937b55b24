//! SSE stream parser for the Anthropic Messages API.
//!
//! The stream sends `event:` and `data:` lines in standard SSE format. This
//! module turns those lines into typed [`SseEvent`] values.

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::types::{SseDelta, SseEvent};

/// Parses raw SSE lines. Keeps the last `event:` type between calls because
/// an event spans an `event:` line and a `data:` line.
#[derive(Debug, Default)]
pub struct SseParser {
    current_event_type: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single line from the stream.
    ///
    /// Returns `Some(event)` once a `data:` line completes an event, `None`
    /// for comments, blank lines and the `event:` prefix line.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<SseEvent>> {
        let line = line.trim_end();

        if line.starts_with(':') || line.is_empty() {
            return Ok(None);
        }

        if let Some(event_type) = line.strip_prefix("event:") {
            self.current_event_type = Some(event_type.trim().to_owned());
            return Ok(None);
        }

        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim_start();
            // Anthropic repeats the type inside the payload; fall back to it
            // when the `event:` line was omitted.
            let event_type = match self.current_event_type.take() {
                Some(t) => t,
                None => serde_json::from_str::<Value>(data)
                    .ok()
                    .and_then(|v| v["type"].as_str().map(String::from))
                    .unwrap_or_else(|| "unknown".into()),
            };
            return self.parse_event(&event_type, data);
        }

        tracing::trace!(line, "ignoring unrecognised SSE line");
        Ok(None)
    }

    fn parse_event(&self, event_type: &str, data: &str) -> Result<Option<SseEvent>> {
        match event_type {
            "message_start" => {
                let v = parse_json(data)?;
                let message = &v["message"];
                Ok(Some(SseEvent::MessageStart {
                    message_id: json_string(message, "id"),
                    model: json_string(message, "model"),
                    input_tokens: message["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
                }))
            }

            "content_block_start" => {
                let v = parse_json(data)?;
                let block = &v["content_block"];
                Ok(Some(SseEvent::ContentBlockStart {
                    index: json_index(&v),
                    content_type: json_string(block, "type"),
                    id: block["id"].as_str().map(String::from),
                    name: block["name"].as_str().map(String::from),
                }))
            }

            "content_block_delta" => {
                let v = parse_json(data)?;
                let delta_obj = &v["delta"];
                let delta = match delta_obj["type"].as_str().unwrap_or_default() {
                    "text_delta" => SseDelta::TextDelta(json_string(delta_obj, "text")),
                    "input_json_delta" => {
                        SseDelta::InputJsonDelta(json_string(delta_obj, "partial_json"))
                    }
                    other => {
                        tracing::debug!(delta_type = other, "skipping delta type");
                        return Ok(None);
                    }
                };
                Ok(Some(SseEvent::ContentBlockDelta {
                    index: json_index(&v),
                    delta,
                }))
            }

            "content_block_stop" => {
                let v = parse_json(data)?;
                Ok(Some(SseEvent::ContentBlockStop {
                    index: json_index(&v),
                }))
            }

            "message_delta" => {
                let v = parse_json(data)?;
                Ok(Some(SseEvent::MessageDelta {
                    stop_reason: v["delta"]["stop_reason"].as_str().map(String::from),
                    output_tokens: v["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
                }))
            }

            "message_stop" => Ok(Some(SseEvent::MessageStop)),

            "ping" => Ok(Some(SseEvent::Ping)),

            "error" => {
                let v = parse_json(data)?;
                Ok(Some(SseEvent::Error {
                    kind: json_string(&v["error"], "type"),
                    message: json_string(&v["error"], "message"),
                }))
            }

            _ => {
                if data.trim() == "[DONE]" {
                    Ok(Some(SseEvent::MessageStop))
                } else {
                    tracing::trace!(event_type, "ignoring unknown SSE event type");
                    Ok(None)
                }
            }
        }
    }
}

fn parse_json(data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|e| AgentError::LlmParseFailed {
        reason: format!("invalid JSON in SSE data: {e}"),
    })
}

fn json_string(v: &Value, field: &str) -> String {
    v[field].as_str().unwrap_or_default().to_owned()
}

fn json_index(v: &Value) -> u32 {
    v["index"].as_u64().unwrap_or(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message_start_with_usage() {
        let mut parser = SseParser::new();
        assert!(parser.parse_line("event: message_start").unwrap().is_none());
        let event = parser
            .parse_line(r#"data: {"type":"message_start","message":{"id":"msg_01","model":"claude-sonnet-4-20250514","usage":{"input_tokens":10,"output_tokens":0}}}"#)
            .unwrap()
            .unwrap();

        assert_eq!(
            event,
            SseEvent::MessageStart {
                message_id: "msg_01".into(),
                model: "claude-sonnet-4-20250514".into(),
                input_tokens: 10,
            }
        );
    }

    #[test]
    fn parse_text_delta() {
        let mut parser = SseParser::new();
        parser.parse_line("event: content_block_delta").unwrap();
        let event = parser
            .parse_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#)
            .unwrap()
            .unwrap();

        assert_eq!(
            event,
            SseEvent::ContentBlockDelta {
                index: 0,
                delta: SseDelta::TextDelta("Hello".into()),
            }
        );
    }

    #[test]
    fn parse_tool_use_block() {
        let mut parser = SseParser::new();
        parser.parse_line("event: content_block_start").unwrap();
        let start = parser
            .parse_line(r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"arxiv","input":{}}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            start,
            SseEvent::ContentBlockStart {
                index: 1,
                content_type: "tool_use".into(),
                id: Some("toolu_1".into()),
                name: Some("arxiv".into()),
            }
        );

        parser.parse_line("event: content_block_delta").unwrap();
        let delta = parser
            .parse_line(r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"query\":"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            delta,
            SseEvent::ContentBlockDelta {
                index: 1,
                delta: SseDelta::InputJsonDelta(r#"{"query":"#.into()),
            }
        );
    }

    #[test]
    fn parse_message_delta_stop_reason() {
        let mut parser = SseParser::new();
        parser.parse_line("event: message_delta").unwrap();
        let event = parser
            .parse_line(r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            SseEvent::MessageDelta {
                stop_reason: Some("tool_use".into()),
                output_tokens: 42,
            }
        );
    }

    #[test]
    fn parse_error_event() {
        let mut parser = SseParser::new();
        parser.parse_line("event: error").unwrap();
        let event = parser
            .parse_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            SseEvent::Error {
                kind: "overloaded_error".into(),
                message: "Overloaded".into(),
            }
        );
    }

    #[test]
    fn data_without_event_line_uses_payload_type() {
        let mut parser = SseParser::new();
        let event = parser
            .parse_line(r#"data: {"type":"message_stop"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, SseEvent::MessageStop);
    }

    #[test]
    fn blank_comment_and_ping_lines() {
        let mut parser = SseParser::new();
        assert!(parser.parse_line("").unwrap().is_none());
        assert!(parser.parse_line(": keepalive").unwrap().is_none());
        parser.parse_line("event: ping").unwrap();
        assert_eq!(parser.parse_line("data: {}").unwrap(), Some(SseEvent::Ping));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut parser = SseParser::new();
        parser.parse_line("event: content_block_delta").unwrap();
        let err = parser.parse_line("data: {not json").unwrap_err();
        assert!(matches!(err, AgentError::LlmParseFailed { .. }));
    }
}
