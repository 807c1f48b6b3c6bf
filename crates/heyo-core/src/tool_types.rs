// Tool definitions, calls and results
//
// Design Decision: Tools are identified by name (string) for extensibility.
// The schema half of a tool (ToolDefinition) is plain data so it can be
// listed and exported without touching the tool's execution strategy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema of a single tool parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// JSON type of the parameter (e.g. "string")
    #[serde(rename = "type")]
    pub kind: String,
    /// Description shown to the model
    pub description: String,
}

impl PropertySchema {
    /// Create a string-typed parameter
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            description: description.into(),
        }
    }
}

/// JSON-schema-like description of a tool's parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Always "object" for tool parameters
    #[serde(rename = "type")]
    pub kind: String,
    /// Names of required properties
    #[serde(default)]
    pub required: Vec<String>,
    /// Per-property schema
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
}

impl ToolParameters {
    /// An object schema with no properties
    pub fn object() -> Self {
        Self {
            kind: "object".to_string(),
            required: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a required property
    pub fn required_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::object()
    }
}

/// Name, description and parameter schema of a registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used by the model and for registry lookup)
    pub name: String,
    /// Tool description for the model
    pub description: String,
    /// Parameter schema
    pub parameters: ToolParameters,
}

/// Tool advertisement in the backend's expected shape
///
/// `{"type": "function", "function": {name, description, parameters}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolDefinition,
}

impl From<ToolDefinition> for ToolSchema {
    fn from(function: ToolDefinition) -> Self {
        Self {
            kind: "function".to_string(),
            function,
        }
    }
}

/// Tool call parsed from a backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Positional ID, unique within one assistant turn (`call_0`, `call_1`, ...)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Arguments, always a JSON object
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Default::default())
}

impl ToolCall {
    /// Create a tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Tool execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool call ID this result corresponds to
    pub tool_call_id: String,
    /// Output text (empty on failure)
    #[serde(default)]
    pub content: String,
    /// Error message (failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            error: None,
        }
    }

    /// Failed result
    pub fn failure(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: String::new(),
            error: Some(error.into()),
        }
    }

    /// Whether the tool failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Content of the tool-role message fed back to the backend
    pub fn to_message_content(&self) -> String {
        match &self.error {
            Some(error) => format!("Error: {error}"),
            None => self.content.clone(),
        }
    }
}
