// Heyo Agent Loop
//
// This crate provides a transport-agnostic implementation of a streaming
// agent loop (backend turn → tool execution → repeat) for Ollama-style chat
// backends.
//
// Key design decisions:
// - Uses traits (ChatBackend, EventEmitter, ToolExecutor) for pluggable backends
// - Emits StreamEvents that serialize to one NDJSON line each
// - Configuration via LoopConfig and BuiltinToolsConfig (built from env by the server)
// - Tools are defined via a Tool trait and held in a shared, lock-guarded ToolRegistry
// - Error handling distinguishes between user-visible and internal tool errors
// - Tool failures are folded into the conversation; only backend failures abort a request

pub mod tool_types;

pub mod backend;
pub mod builtin;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod tools;
pub mod traits;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use backend::{
    parse_tool_calls, BackendChatRequest, BackendChatResponse, BackendChunk, BackendMessage,
    BackendToolCall, FunctionCall, StreamAggregator,
};
pub use builtin::{register_builtin_tools, CalculateTool, ExecutionServiceClient, PythonTool};
pub use config::{BuiltinToolsConfig, LoopConfig, ToolDispatch, DEFAULT_SYSTEM_PROMPT};
pub use error::{AgentLoopError, Result};
pub use events::{DoneReason, StreamEvent};
pub use executor::{AgentLoop, ChatRequest, LoopOutcome, LoopStop};
pub use message::{ensure_system_message, ConversationMessage, MessageRole};
pub use tool_types::{
    PropertySchema, ToolCall, ToolDefinition, ToolParameters, ToolResult, ToolSchema,
};
pub use tools::{
    RegistryToolExecutor, Tool, ToolExecutionResult, ToolInternalError, ToolRegistry,
    ToolRegistryBuilder,
};
pub use traits::{BackendChunkStream, ChatBackend, EventEmitter, ToolExecutor};
