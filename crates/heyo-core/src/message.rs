// Conversation message types
//
// ConversationMessage is the validated shape of one entry in a client
// conversation. Unknown roles are rejected when the request is parsed.

use crate::tool_types::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message role
    pub role: MessageRole,

    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant (assistant messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Tool call this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Create an assistant message carrying tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Create the tool-role message answering one tool call
    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(result.to_message_content()),
            tool_calls: None,
            tool_call_id: Some(result.tool_call_id.clone()),
        }
    }

    /// Text content, empty when absent
    pub fn content_text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Prepend `system_prompt` unless the conversation already has a system message
pub fn ensure_system_message(
    messages: Vec<ConversationMessage>,
    system_prompt: &str,
) -> Vec<ConversationMessage> {
    if messages.iter().any(|m| m.role == MessageRole::System) {
        return messages;
    }

    let mut with_system = Vec::with_capacity(messages.len() + 1);
    with_system.push(ConversationMessage::system(system_prompt));
    with_system.extend(messages);
    with_system
}
