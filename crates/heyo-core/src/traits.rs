// Core traits for pluggable backends
//
// These traits allow the agent loop to be used with different backends:
// - HTTP implementations for production (Ollama backend, NDJSON response body)
// - In-memory implementations for examples and testing

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::backend::{BackendChatRequest, BackendChunk};
use crate::error::Result;
use crate::events::StreamEvent;
use crate::tool_types::{ToolCall, ToolResult};

// ============================================================================
// EventEmitter - For streaming events during execution
// ============================================================================

/// Trait for emitting events during loop execution
///
/// Implementations can:
/// - Send events to a channel feeding an HTTP response body
/// - Collect events in memory for testing
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emit a single event
    ///
    /// Fails with `AgentLoopError::Cancelled` once the consumer is gone.
    async fn emit(&self, event: StreamEvent) -> Result<()>;

    /// Emit multiple events
    async fn emit_batch(&self, events: Vec<StreamEvent>) -> Result<()> {
        for event in events {
            self.emit(event).await?;
        }
        Ok(())
    }

    /// Resolves once the consumer has gone away
    ///
    /// The loop races every suspension point against this. The default
    /// never resolves.
    async fn closed(&self) {
        futures::future::pending::<()>().await
    }
}

// ============================================================================
// ChatBackend - For calling the inference backend
// ============================================================================

/// Stream of parsed backend chunks for one turn
pub type BackendChunkStream = Pin<Box<dyn Stream<Item = Result<BackendChunk>> + Send>>;

/// Trait for inference backends
///
/// Implementations issue one streaming chat call and yield each parsed
/// chunk. Malformed lines are dropped by the implementation; the stream
/// ends after the chunk carrying the completion marker or when the
/// transport closes.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streaming chat call
    ///
    /// Fails with `BackendUnavailable` when the call cannot be made and with
    /// `BackendError` (carrying the raw body) on a non-success status.
    async fn chat_stream(&self, request: &BackendChatRequest) -> Result<BackendChunkStream>;
}

// ============================================================================
// ToolExecutor - For executing tool calls
// ============================================================================

/// Trait for executing tool calls
///
/// Execution never fails as a whole: unknown tools and tool errors come
/// back as `ToolResult`s with `error` set.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a single tool call
    async fn execute(&self, tool_call: &ToolCall) -> ToolResult;

    /// Execute a batch, one call after another, in input order
    async fn execute_all(&self, tool_calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for tool_call in tool_calls {
            results.push(self.execute(tool_call).await);
        }
        results
    }
}
