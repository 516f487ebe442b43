use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded record from the agent CLI's `stream-json` stdout.
///
/// The set of variants is closed: every line the agent emits maps onto
/// exactly these shapes, with anything unrecognized or malformed landing
/// in `Unknown` rather than failing the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    SessionStart,
    AssistantText {
        text: String,
    },
    ToolCall {
        name: String,
        input: Value,
    },
    ToolResult {
        is_error: bool,
        content: Value,
    },
    Final {
        result: Option<String>,
        duration_ms: Option<u64>,
    },
    Unknown {
        raw: String,
    },
}

/// Decodes one stdout line into zero or more events.
///
/// Assistant messages carry a list of content segments and expand to one
/// event per segment. Blank lines decode to nothing. Decoding never errors.
pub fn decode_line(line: &str) -> Vec<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let data: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => {
            return vec![StreamEvent::Unknown {
                raw: trimmed.to_string(),
            }]
        }
    };
    match data.get("type").and_then(Value::as_str) {
        Some("system") if data.get("subtype").and_then(Value::as_str) == Some("init") => {
            vec![StreamEvent::SessionStart]
        }
        Some("assistant") => decode_assistant_segments(&data),
        Some("tool_result") => vec![StreamEvent::ToolResult {
            is_error: data
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            content: data.get("content").cloned().unwrap_or(Value::Null),
        }],
        Some("result") => vec![StreamEvent::Final {
            result: final_text(&data),
            duration_ms: data.get("duration_ms").and_then(Value::as_u64),
        }],
        _ => vec![StreamEvent::Unknown {
            raw: trimmed.to_string(),
        }],
    }
}

fn decode_assistant_segments(data: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let Some(segments) = data.pointer("/message/content").and_then(Value::as_array) else {
        return events;
    };
    for segment in segments {
        match segment.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = segment.get("text").and_then(Value::as_str) {
                    events.push(StreamEvent::AssistantText {
                        text: text.to_string(),
                    });
                }
            }
            Some("tool_use") => events.push(StreamEvent::ToolCall {
                name: segment
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                input: segment.get("input").cloned().unwrap_or(Value::Null),
            }),
            _ => {}
        }
    }
    events
}

fn final_text(data: &Value) -> Option<String> {
    match data.get("result") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => serde_json::to_string(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_session_init() {
        let line = json!({"type": "system", "subtype": "init", "session_id": "s1"}).to_string();
        assert_eq!(decode_line(&line), vec![StreamEvent::SessionStart]);
    }

    #[test]
    fn assistant_line_expands_per_segment() {
        let line = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "running step 1"},
                {"type": "tool_use", "name": "db_query", "input": {"sql": "SELECT 1"}},
            ]}
        })
        .to_string();
        assert_eq!(
            decode_line(&line),
            vec![
                StreamEvent::AssistantText {
                    text: "running step 1".to_string()
                },
                StreamEvent::ToolCall {
                    name: "db_query".to_string(),
                    input: json!({"sql": "SELECT 1"}),
                },
            ]
        );
    }

    #[test]
    fn assistant_line_with_no_segments_decodes_to_nothing() {
        let line = json!({"type": "assistant", "message": {"content": []}}).to_string();
        assert!(decode_line(&line).is_empty());
    }

    #[test]
    fn tool_result_defaults_error_flag_to_false() {
        let line = json!({"type": "tool_result", "content": "ok"}).to_string();
        assert_eq!(
            decode_line(&line),
            vec![StreamEvent::ToolResult {
                is_error: false,
                content: json!("ok"),
            }]
        );
    }

    #[test]
    fn final_line_carries_payload_and_duration() {
        let line =
            json!({"type": "result", "result": "{\"verdict\": \"PASS\"}", "duration_ms": 1200})
                .to_string();
        assert_eq!(
            decode_line(&line),
            vec![StreamEvent::Final {
                result: Some("{\"verdict\": \"PASS\"}".to_string()),
                duration_ms: Some(1200),
            }]
        );
    }

    #[test]
    fn garbage_maps_to_unknown() {
        assert_eq!(
            decode_line("not json at all"),
            vec![StreamEvent::Unknown {
                raw: "not json at all".to_string()
            }]
        );
    }

    #[test]
    fn unrecognized_type_maps_to_unknown() {
        let line = json!({"type": "billing", "tokens": 9}).to_string();
        assert_eq!(
            decode_line(&line),
            vec![StreamEvent::Unknown { raw: line.clone() }]
        );
    }

    #[test]
    fn non_object_json_maps_to_unknown() {
        assert_eq!(
            decode_line("[1, 2, 3]"),
            vec![StreamEvent::Unknown {
                raw: "[1, 2, 3]".to_string()
            }]
        );
    }

    #[test]
    fn blank_lines_decode_to_nothing() {
        assert!(decode_line("   ").is_empty());
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = StreamEvent::ToolCall {
            name: "store_value".to_string(),
            input: json!({"name": "x"}),
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded.get("event"), Some(&json!("tool_call")));
    }
}
