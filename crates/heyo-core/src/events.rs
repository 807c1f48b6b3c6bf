// Stream events for the client
//
// StreamEvent is the wire contract of the chat endpoint: every event is
// serialized as one NDJSON line tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool_types::{ToolCall, ToolResult};

/// Why the stream ended, when it did not end naturally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The iteration cap was hit while tool calls were still pending
    MaxIterations,
}

/// Events emitted to the client during one chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text fragment produced by the backend
    Content { delta: String },

    /// The backend asked for a tool
    ToolCall { id: String, name: String, args: Value },

    /// A tool finished
    ToolResult {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The request failed
    Error { error: String },

    /// Last event of every stream
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<DoneReason>,
    },
}

impl StreamEvent {
    /// Create a content event
    pub fn content(delta: impl Into<String>) -> Self {
        StreamEvent::Content {
            delta: delta.into(),
        }
    }

    /// Create a tool call event
    pub fn tool_call(call: &ToolCall) -> Self {
        StreamEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.arguments.clone(),
        }
    }

    /// Create a tool result event
    pub fn tool_result(result: &ToolResult) -> Self {
        StreamEvent::ToolResult {
            id: result.tool_call_id.clone(),
            content: result.content.clone(),
            error: result.error.clone(),
        }
    }

    /// Create an error event
    pub fn error(error: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: error.into(),
        }
    }

    /// Create a done event for a loop that finished on its own
    pub fn done() -> Self {
        StreamEvent::Done { reason: None }
    }

    /// Create a done event for a loop that gave up at the iteration cap
    pub fn done_at_cap() -> Self {
        StreamEvent::Done {
            reason: Some(DoneReason::MaxIterations),
        }
    }

    /// Event type tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Content { .. } => "content",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done { .. } => "done",
        }
    }

    /// Serialize as a newline-terminated JSON line
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"failed to encode event: {e}"}}"#)
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let call = ToolCall::new("call_0", "calculate", json!({"expression": "2+2"}));
        let cases = vec![
            (
                StreamEvent::content("Hel"),
                json!({"type": "content", "delta": "Hel"}),
            ),
            (
                StreamEvent::tool_call(&call),
                json!({
                    "type": "tool_call",
                    "id": "call_0",
                    "name": "calculate",
                    "args": {"expression": "2+2"},
                }),
            ),
            (
                StreamEvent::tool_result(&ToolResult::success("call_0", "4")),
                json!({"type": "tool_result", "id": "call_0", "content": "4"}),
            ),
            (
                StreamEvent::tool_result(&ToolResult::failure("call_1", "unknown tool: foo")),
                json!({
                    "type": "tool_result",
                    "id": "call_1",
                    "content": "",
                    "error": "unknown tool: foo",
                }),
            ),
            (
                StreamEvent::error("backend unavailable"),
                json!({"type": "error", "error": "backend unavailable"}),
            ),
            (StreamEvent::done(), json!({"type": "done"})),
            (
                StreamEvent::done_at_cap(),
                json!({"type": "done", "reason": "max_iterations"}),
            ),
        ];

        for (event, expected) in cases {
            assert_eq!(serde_json::to_value(&event).unwrap(), expected, "{event:?}");
        }
    }

    #[test]
    fn test_to_ndjson_is_single_line() {
        let line = StreamEvent::content("line one\nline two").to_ndjson();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(StreamEvent::done().kind(), "done");
    }
}
