// Ollama wire types
//
// Request body of `POST /api/chat` and the shape of each NDJSON line in
// its streaming response.

use heyo_core::{BackendChunk, BackendMessage, BackendToolCall, ConversationMessage, ToolSchema};
use serde::{Deserialize, Serialize};

/// Body of a streaming chat call
#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    pub tools: Vec<ToolSchema>,
}

/// A conversation message in Ollama's format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OllamaMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<BackendToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&ConversationMessage> for OllamaMessage {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content_text().to_string(),
            tool_calls: message.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| BackendToolCall::function(&call.name, call.arguments.clone()))
                    .collect()
            }),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

/// One line of the streaming response
///
/// Ollama reports failures that happen after the status line was sent as a
/// line carrying only `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaStreamLine {
    #[serde(default)]
    pub message: Option<BackendMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl OllamaStreamLine {
    pub fn into_chunk(self) -> BackendChunk {
        BackendChunk {
            message: self.message,
            done: self.done,
        }
    }
}
