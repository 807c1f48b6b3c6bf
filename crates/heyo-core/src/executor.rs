// Agent Loop Executor
//
// The orchestrator for one chat request. Coordinates:
// - Calling the backend via ChatBackend, forwarding content deltas live
// - Executing tool calls via ToolExecutor
// - Emitting events via EventEmitter
//
// The loop owns the conversation for the duration of the request. Every
// suspension point is raced against the emitter's `closed` signal, so a
// client that goes away stops the loop and drops in-flight work.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendChatRequest, BackendChatResponse, StreamAggregator};
use crate::config::LoopConfig;
use crate::error::{AgentLoopError, Result};
use crate::events::StreamEvent;
use crate::message::{ensure_system_message, ConversationMessage};
use crate::tools::{RegistryToolExecutor, ToolRegistry};
use crate::traits::{ChatBackend, EventEmitter, ToolExecutor};

/// Inbound chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier passed through to the backend
    pub model: String,
    /// Conversation so far
    pub messages: Vec<ConversationMessage>,
    /// Accepted for compatibility; responses are always streamed
    #[serde(default)]
    pub stream: bool,
}

/// How a loop run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// A turn came back without tool calls
    Completed,
    /// The iteration cap was reached with tool calls still being requested
    MaxIterations,
}

/// Result of a complete loop execution
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Final conversation, including the system message and every turn
    pub messages: Vec<ConversationMessage>,
    /// Backend turns performed
    pub iterations: usize,
    /// Text of the last turn, if it had any
    pub final_response: Option<String>,
    /// Why the loop stopped
    pub stop: LoopStop,
}

/// The Agent Loop
///
/// Shared across requests; each call to [`AgentLoop::run`] is independent.
pub struct AgentLoop {
    config: LoopConfig,
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ToolRegistry>,
    tool_executor: Arc<dyn ToolExecutor>,
}

impl AgentLoop {
    /// Create a loop that executes tools from `registry`
    pub fn new(
        config: LoopConfig,
        backend: Arc<dyn ChatBackend>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let tool_executor = Arc::new(
            RegistryToolExecutor::new(registry.clone()).with_dispatch(config.tool_dispatch),
        );
        Self {
            config,
            backend,
            registry,
            tool_executor,
        }
    }

    /// Replace the tool executor (the registry still supplies the schema)
    pub fn with_tool_executor(mut self, tool_executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = tool_executor;
        self
    }

    /// Get the tool registry
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the loop for one request, streaming events to `emitter`
    ///
    /// Always ends the stream with `done` unless the client went away. A
    /// backend failure is reported as an `error` event followed by `done`
    /// and is also returned to the caller.
    pub async fn run(
        &self,
        request: ChatRequest,
        emitter: &dyn EventEmitter,
    ) -> Result<LoopOutcome> {
        if request.messages.is_empty() {
            return Err(AgentLoopError::NoMessages);
        }

        let model = request.model;
        let mut messages = ensure_system_message(request.messages, &self.config.system_prompt);
        let mut final_response = None;
        let mut stop = LoopStop::MaxIterations;
        let mut iterations = 0;

        info!(model = %model, messages = messages.len(), "Starting agent loop");

        while iterations < self.config.max_iterations {
            iterations += 1;
            debug!(iteration = iterations, "Starting iteration");

            let turn = self.call_backend(&model, &messages, emitter);
            let response = match until_closed(emitter, turn)
                .await
                .and_then(|result| result)
            {
                Ok(response) => response,
                Err(e) if e.is_cancelled() => {
                    info!(iteration = iterations, "Client disconnected, stopping loop");
                    return Err(e);
                }
                Err(e) => {
                    error!(iteration = iterations, error = %e, "Backend call failed");
                    emitter
                        .emit_batch(vec![StreamEvent::error(e.to_string()), StreamEvent::done()])
                        .await?;
                    return Err(e);
                }
            };

            let content = response.content().to_string();
            let tool_calls = response.tool_calls();

            if tool_calls.is_empty() {
                messages.push(ConversationMessage::assistant(&content));
                if !content.is_empty() {
                    final_response = Some(content);
                }
                stop = LoopStop::Completed;
                break;
            }

            info!(
                iteration = iterations,
                tool_calls = tool_calls.len(),
                "Executing tool calls"
            );

            emitter
                .emit_batch(tool_calls.iter().map(StreamEvent::tool_call).collect())
                .await?;

            let results = until_closed(emitter, self.tool_executor.execute_all(&tool_calls))
                .await
                .inspect_err(|_| {
                    info!(
                        iteration = iterations,
                        "Client disconnected during tool execution"
                    )
                })?;

            emitter
                .emit_batch(results.iter().map(StreamEvent::tool_result).collect())
                .await?;

            messages.push(ConversationMessage::assistant_with_tools(content, tool_calls));
            messages.extend(results.iter().map(ConversationMessage::tool_result));
        }

        let done = match stop {
            LoopStop::Completed => StreamEvent::done(),
            LoopStop::MaxIterations => {
                warn!(
                    max = self.config.max_iterations,
                    "Max iterations reached with tool calls pending"
                );
                StreamEvent::done_at_cap()
            }
        };
        emitter.emit(done).await?;

        info!(iterations = iterations, stop = ?stop, "Agent loop completed");

        Ok(LoopOutcome {
            messages,
            iterations,
            final_response,
            stop,
        })
    }

    // =========================================================================
    // Private methods
    // =========================================================================

    /// One backend turn: stream, forward deltas, aggregate
    async fn call_backend(
        &self,
        model: &str,
        messages: &[ConversationMessage],
        emitter: &dyn EventEmitter,
    ) -> Result<BackendChatResponse> {
        let request = BackendChatRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: self.registry.export_schema(),
        };

        debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling backend"
        );

        let mut stream = self.backend.chat_stream(&request).await?;
        let mut aggregator = StreamAggregator::new();

        while let Some(chunk) = stream.next().await {
            if let Some(delta) = aggregator.push(chunk?) {
                emitter.emit(StreamEvent::content(delta)).await?;
            }
            if aggregator.is_done() {
                break;
            }
        }

        Ok(aggregator.finish())
    }
}

/// Run `fut` unless the client goes away first
async fn until_closed<F>(emitter: &dyn EventEmitter, fut: F) -> Result<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = emitter.closed() => Err(AgentLoopError::Cancelled),
        output = fut => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendChunk, BackendToolCall};
    use crate::memory::{CollectingEventEmitter, EchoTool, ScriptedBackend, ScriptedTurn};
    use crate::message::MessageRole;
    use serde_json::json;

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: vec![ConversationMessage::user(text)],
            stream: true,
        }
    }

    fn echo_loop(backend: ScriptedBackend) -> (AgentLoop, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let registry = Arc::new(ToolRegistry::builder().tool(EchoTool).build());
        (
            AgentLoop::new(LoopConfig::default(), backend.clone(), registry),
            backend,
        )
    }

    #[test]
    fn test_chat_request_stream_flag_optional() {
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .unwrap();
        assert!(!request.stream);
        assert_eq!(request.messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let (agent, backend) = echo_loop(ScriptedBackend::new().turn(vec![
            BackendChunk::content("Hel"),
            BackendChunk::content("lo"),
            BackendChunk::done(),
        ]));
        let emitter = CollectingEventEmitter::new();

        let outcome = agent.run(request("hi"), &emitter).await.unwrap();

        assert_eq!(
            emitter.events(),
            vec![
                StreamEvent::content("Hel"),
                StreamEvent::content("lo"),
                StreamEvent::done()
            ]
        );
        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.final_response.as_deref(), Some("Hello"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_request_carries_system_prompt_and_tools() {
        let (agent, backend) =
            echo_loop(ScriptedBackend::new().turn(vec![BackendChunk::done()]));
        let emitter = CollectingEventEmitter::new();

        agent.run(request("hi"), &emitter).await.unwrap();

        let sent = &backend.requests()[0];
        assert_eq!(sent.model, "m");
        assert_eq!(sent.messages[0].role, MessageRole::System);
        assert_eq!(sent.messages[1], ConversationMessage::user("hi"));
        assert_eq!(sent.tools.len(), 1);
        assert_eq!(sent.tools[0].function.name, "echo");
    }

    #[tokio::test]
    async fn test_tool_round_trip_history() {
        let (agent, backend) = echo_loop(
            ScriptedBackend::new()
                .turn(vec![
                    BackendChunk::tool_calls(vec![BackendToolCall::function(
                        "echo",
                        json!({"message": "pong"}),
                    )]),
                    BackendChunk::done(),
                ])
                .turn(vec![BackendChunk::content("pong!"), BackendChunk::done()]),
        );
        let emitter = CollectingEventEmitter::new();

        let outcome = agent.run(request("ping"), &emitter).await.unwrap();

        assert_eq!(emitter.kinds(), vec!["tool_call", "tool_result", "content", "done"]);

        let second = &backend.requests()[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, MessageRole::Assistant);
        assert_eq!(second[2].tool_calls.as_ref().unwrap()[0].id, "call_0");
        assert_eq!(second[3].role, MessageRole::Tool);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(second[3].content_text(), "pong");
        assert_eq!(outcome.messages.len(), 5);
    }

    #[tokio::test]
    async fn test_backend_failure_emits_error_then_done() {
        let (agent, _) = echo_loop(
            ScriptedBackend::new().then(ScriptedTurn::Unavailable("connection refused".into())),
        );
        let emitter = CollectingEventEmitter::new();

        let err = agent.run(request("hi"), &emitter).await.unwrap_err();

        assert!(matches!(err, AgentLoopError::BackendUnavailable(_)));
        assert_eq!(
            emitter.events(),
            vec![
                StreamEvent::error("backend unavailable: connection refused"),
                StreamEvent::done()
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_conversation_rejected() {
        let (agent, backend) = echo_loop(ScriptedBackend::new());
        let emitter = CollectingEventEmitter::new();
        let request = ChatRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            stream: false,
        };

        let err = agent.run(request, &emitter).await.unwrap_err();

        assert!(matches!(err, AgentLoopError::NoMessages));
        assert!(emitter.events().is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_while_backend_hangs() {
        let (agent, _) = echo_loop(ScriptedBackend::new().then(ScriptedTurn::Hang));
        let emitter = Arc::new(CollectingEventEmitter::new());

        let closer = {
            let emitter = emitter.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                emitter.close();
            })
        };

        let err = agent.run(request("hi"), emitter.as_ref()).await.unwrap_err();
        closer.await.unwrap();

        assert!(err.is_cancelled());
        assert!(emitter.events().is_empty());
    }
}
