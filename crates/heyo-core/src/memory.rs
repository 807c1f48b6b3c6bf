// In-memory implementations for examples and testing
//
// These implementations keep everything in memory, making them useful for:
// - Unit and integration tests of the agent loop
// - Driving the HTTP layer without a running inference backend

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};

use crate::backend::{BackendChatRequest, BackendChunk};
use crate::error::{AgentLoopError, Result};
use crate::events::StreamEvent;
use crate::tool_types::{PropertySchema, ToolParameters};
use crate::tools::{Tool, ToolExecutionResult};
use crate::traits::{BackendChunkStream, ChatBackend, EventEmitter};

// ============================================================================
// ChannelEventEmitter - Feeds events into an mpsc channel
// ============================================================================

/// Emitter backed by a bounded channel
///
/// The receiving half usually feeds a streaming response body. Once the
/// receiver is dropped, `emit` fails with `Cancelled` and `closed` resolves.
#[derive(Debug, Clone)]
pub struct ChannelEventEmitter {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelEventEmitter {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Create an emitter together with its receiving half
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventEmitter for ChannelEventEmitter {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AgentLoopError::Cancelled)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

// ============================================================================
// CollectingEventEmitter - Records events for assertions
// ============================================================================

/// Emitter that stores every event in order
///
/// `close()` simulates a client disconnect: later emits fail and `closed()`
/// resolves.
#[derive(Debug)]
pub struct CollectingEventEmitter {
    events: Mutex<Vec<StreamEvent>>,
    closed: watch::Sender<bool>,
}

impl CollectingEventEmitter {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            closed: watch::Sender::new(false),
        }
    }

    /// Snapshot of the events emitted so far
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    /// Wire type tags of the events emitted so far
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(StreamEvent::kind).collect()
    }

    /// Simulate the consumer going away
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Default for CollectingEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventEmitter for CollectingEventEmitter {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        if self.is_closed() {
            return Err(AgentLoopError::Cancelled);
        }
        self.events.lock().push(event);
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as self, so this only returns once closed
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

// ============================================================================
// ScriptedBackend - Replays canned backend turns
// ============================================================================

/// One canned backend turn
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these chunks, then end
    Chunks(Vec<BackendChunk>),
    /// Fail the call with `BackendUnavailable`
    Unavailable(String),
    /// Fail the call with `BackendError`
    Status(String),
    /// Stream these chunks, then break off with `BackendStream`
    BreaksAfter(Vec<BackendChunk>, String),
    /// Accept the call and never produce a chunk
    Hang,
}

/// Backend that replays a fixed script of turns and records every request
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    repeat: Option<ScriptedTurn>,
    requests: Mutex<Vec<BackendChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn streaming the given chunks
    pub fn turn(self, chunks: Vec<BackendChunk>) -> Self {
        self.then(ScriptedTurn::Chunks(chunks))
    }

    /// Append an arbitrary turn
    pub fn then(self, turn: ScriptedTurn) -> Self {
        self.turns.lock().push_back(turn);
        self
    }

    /// Turn to replay once the script is exhausted
    pub fn always(mut self, turn: ScriptedTurn) -> Self {
        self.repeat = Some(turn);
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<BackendChatRequest> {
        self.requests.lock().clone()
    }

    /// Number of backend calls made so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat_stream(&self, request: &BackendChatRequest) -> Result<BackendChunkStream> {
        self.requests.lock().push(request.clone());

        let turn = self.turns.lock().pop_front().or_else(|| self.repeat.clone());

        match turn {
            Some(ScriptedTurn::Chunks(chunks)) => {
                let items: Vec<Result<BackendChunk>> = chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Some(ScriptedTurn::Unavailable(message)) => Err(AgentLoopError::unavailable(message)),
            Some(ScriptedTurn::Status(body)) => Err(AgentLoopError::backend(body)),
            Some(ScriptedTurn::BreaksAfter(chunks, message)) => {
                let items: Vec<Result<BackendChunk>> = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(AgentLoopError::stream(message))))
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Some(ScriptedTurn::Hang) => Ok(Box::pin(stream::pending::<Result<BackendChunk>>())),
            None => Err(AgentLoopError::backend("script exhausted")),
        }
    }
}

// ============================================================================
// Test tools
// ============================================================================

/// Echoes its `message` argument back
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided message. Useful for testing tool execution."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::object()
            .required_property("message", PropertySchema::string("The message to echo back"))
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        ToolExecutionResult::success(message)
    }
}

/// A tool that always fails (for testing error handling)
pub struct FailingTool {
    error_message: String,
    use_internal_error: bool,
}

impl FailingTool {
    /// Create a failing tool with a tool-level error
    pub fn with_tool_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            use_internal_error: false,
        }
    }

    /// Create a failing tool with an internal error
    pub fn with_internal_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            use_internal_error: true,
        }
    }
}

impl Default for FailingTool {
    fn default() -> Self {
        Self::with_tool_error("Tool execution failed")
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails (for testing error handling)"
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::object()
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        if self.use_internal_error {
            ToolExecutionResult::internal_error_msg(&self.error_message)
        } else {
            ToolExecutionResult::tool_error(&self.error_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;

    fn request() -> BackendChatRequest {
        BackendChatRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new()
            .turn(vec![BackendChunk::content("a"), BackendChunk::done()])
            .then(ScriptedTurn::Unavailable("down".to_string()));

        let chunks: Vec<_> = backend
            .chat_stream(&request())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);

        let err = backend.chat_stream(&request()).await.err().unwrap();
        assert!(matches!(err, AgentLoopError::BackendUnavailable(_)));

        let err = backend.chat_stream(&request()).await.err().unwrap();
        assert!(matches!(err, AgentLoopError::BackendError(_)));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_channel_emitter_reports_dropped_receiver() {
        let (emitter, rx) = ChannelEventEmitter::channel(4);
        emitter.emit(StreamEvent::done()).await.unwrap();
        drop(rx);

        let err = emitter.emit(StreamEvent::done()).await.unwrap_err();
        assert!(err.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), emitter.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collecting_emitter_close() {
        let emitter = Arc::new(CollectingEventEmitter::new());
        emitter.emit(StreamEvent::content("x")).await.unwrap();

        let waiter = {
            let emitter = emitter.clone();
            tokio::spawn(async move { emitter.closed().await })
        };
        emitter.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        assert!(emitter.emit(StreamEvent::done()).await.is_err());
        assert_eq!(emitter.kinds(), vec!["content"]);
    }
}
