// Backend chunk types and response aggregation
//
// A backend turn arrives as a sequence of independent chunks (one per NDJSON
// line). StreamAggregator folds them into the final message of the turn:
// - the first chunk carrying a non-empty tool-call list is retained and is
//   never overwritten afterwards
// - otherwise the first chunk carrying a message is retained
// - the retained message's content is the concatenation of every delta
//
// Some backends announce tool calls once early and then stream trailing
// content-only chunks, which is why later chunks never replace a retained
// tool-call-bearing message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ConversationMessage, MessageRole};
use crate::tool_types::{ToolCall, ToolSchema};

/// Request for one backend turn
#[derive(Debug, Clone, PartialEq)]
pub struct BackendChatRequest {
    /// Model identifier passed through from the client
    pub model: String,
    /// Full conversation so far
    pub messages: Vec<ConversationMessage>,
    /// Tool advertisement, possibly empty
    pub tools: Vec<ToolSchema>,
}

/// Function part of a backend tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// Either a JSON object or a JSON-encoded string
    #[serde(default)]
    pub arguments: Value,
}

/// Tool call as the backend emits it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendToolCall {
    #[serde(default)]
    pub function: Option<FunctionCall>,
}

impl BackendToolCall {
    /// Build a backend tool call (mostly useful in tests)
    pub fn function(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: Some(FunctionCall {
                name: name.into(),
                arguments,
            }),
        }
    }
}

fn default_role() -> MessageRole {
    MessageRole::Assistant
}

/// Message part of a backend chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    #[serde(default = "default_role")]
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<BackendToolCall>>,
}

impl BackendMessage {
    /// Assistant message with text only
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Assistant message carrying tool calls
    pub fn with_tool_calls(tool_calls: Vec<BackendToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(String::new()),
            tool_calls: Some(tool_calls),
        }
    }

    /// Whether the message carries a non-empty tool-call list
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// One parsed line of the backend stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendChunk {
    #[serde(default)]
    pub message: Option<BackendMessage>,
    /// Completion marker
    #[serde(default)]
    pub done: bool,
}

impl BackendChunk {
    /// A content-only chunk
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            message: Some(BackendMessage::text(delta)),
            done: false,
        }
    }

    /// A chunk announcing tool calls
    pub fn tool_calls(tool_calls: Vec<BackendToolCall>) -> Self {
        Self {
            message: Some(BackendMessage::with_tool_calls(tool_calls)),
            done: false,
        }
    }

    /// The final chunk of a turn
    pub fn done() -> Self {
        Self {
            message: Some(BackendMessage::text("")),
            done: true,
        }
    }
}

/// Aggregated result of one backend turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendChatResponse {
    /// Retained message with the full turn content
    pub message: Option<BackendMessage>,
    /// Whether the backend sent its completion marker
    pub done: bool,
}

impl BackendChatResponse {
    /// Full text of the turn
    pub fn content(&self) -> &str {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .unwrap_or("")
    }

    /// Tool calls requested in this turn, with positional IDs
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.message
            .as_ref()
            .map(parse_tool_calls)
            .unwrap_or_default()
    }
}

/// Incremental fold over the chunks of one backend turn
#[derive(Debug, Default)]
pub struct StreamAggregator {
    retained: Option<BackendMessage>,
    content: String,
    done: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in; returns the text delta to forward, if any
    pub fn push(&mut self, chunk: BackendChunk) -> Option<String> {
        let mut delta = None;

        if let Some(message) = chunk.message {
            if let Some(text) = message.content.as_deref().filter(|t| !t.is_empty()) {
                self.content.push_str(text);
                delta = Some(text.to_string());
            }

            let retained_has_tools = self
                .retained
                .as_ref()
                .is_some_and(BackendMessage::has_tool_calls);

            if !retained_has_tools && (message.has_tool_calls() || self.retained.is_none()) {
                self.retained = Some(message);
            }
        }

        if chunk.done {
            self.done = true;
        }

        delta
    }

    /// Whether the completion marker has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Finalize the turn
    pub fn finish(self) -> BackendChatResponse {
        let content = self.content;
        BackendChatResponse {
            message: self.retained.map(|mut message| {
                message.content = Some(content);
                message
            }),
            done: self.done,
        }
    }
}

/// Extract tool calls from a backend message
///
/// IDs are positional over the raw list (`call_<index>`); entries without a
/// function name are skipped but still consume their index. String-encoded
/// arguments are decoded; anything that is not an object becomes `{}`.
pub fn parse_tool_calls(message: &BackendMessage) -> Vec<ToolCall> {
    let Some(raw_calls) = &message.tool_calls else {
        return Vec::new();
    };

    raw_calls
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let function = raw.function.as_ref()?;
            if function.name.is_empty() {
                return None;
            }
            Some(ToolCall::new(
                format!("call_{index}"),
                function.name.clone(),
                normalize_arguments(&function.arguments),
            ))
        })
        .collect()
}

fn normalize_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::Object(_) => arguments.clone(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(decoded @ Value::Object(_)) => decoded,
            _ => Value::Object(Default::default()),
        },
        _ => Value::Object(Default::default()),
    }
}
