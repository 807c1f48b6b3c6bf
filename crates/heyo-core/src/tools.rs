// Tool Abstraction for the Agent Loop
//
// Tools are defined using the `Tool` trait and registered with a shared
// `ToolRegistry`. `RegistryToolExecutor` dispatches tool calls against the
// registry and implements `ToolExecutor` for the loop.
//
// Design decisions:
// - A tool's identity (name/schema) is separate from how it executes
// - The registry is read-mostly and guarded by a reader/writer lock; the lock
//   is never held across an await
// - Error handling distinguishes between user-visible errors and internal errors
// - Internal errors are logged but not exposed to the model

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::ToolDispatch;
use crate::tool_types::{ToolCall, ToolDefinition, ToolParameters, ToolResult, ToolSchema};
use crate::traits::ToolExecutor;

// ============================================================================
// Tool Execution Result - Error Handling Contract
// ============================================================================

/// Result of a tool execution.
///
/// - `Success`: output text returned to the model
/// - `ToolError`: tool-level error that is safe to show to the model
///   (e.g. "expression must be a string", "Unknown variable: x")
/// - `InternalError`: system-level error whose details stay in the logs
///   (e.g. an undecodable execution-service response)
#[derive(Debug)]
pub enum ToolExecutionResult {
    /// Successful execution
    Success(String),

    /// Tool-level error that is safe to show to the model
    ToolError(String),

    /// Internal/system error that should NOT be exposed to the model
    InternalError(ToolInternalError),
}

impl ToolExecutionResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        ToolExecutionResult::Success(output.into())
    }

    /// Create a tool-level error (safe to show to the model)
    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    /// Create an internal error (will be hidden from the model)
    pub fn internal_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::new(error))
    }

    /// Create an internal error from a string message
    pub fn internal_error_msg(message: impl Into<String>) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::from_message(message))
    }

    /// Check if this is a successful result
    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success(_))
    }

    /// Convert to a ToolResult for the agent loop
    ///
    /// Internal errors are logged and replaced with a generic message.
    pub fn into_tool_result(self, tool_call_id: &str, tool_name: &str) -> ToolResult {
        match self {
            ToolExecutionResult::Success(output) => ToolResult::success(tool_call_id, output),
            ToolExecutionResult::ToolError(message) => ToolResult::failure(tool_call_id, message),
            ToolExecutionResult::InternalError(err) => {
                error!(
                    tool_name = %tool_name,
                    tool_call_id = %tool_call_id,
                    error = %err.message,
                    "Tool internal error (details hidden from model)"
                );
                ToolResult::failure(
                    tool_call_id,
                    "An internal error occurred while executing the tool",
                )
            }
        }
    }
}

/// Internal error details (logged but not exposed to the model)
#[derive(Debug)]
pub struct ToolInternalError {
    /// Error message for logging
    pub message: String,
    /// Optional source error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolInternalError {
    /// Create from an error
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Create from a string message
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl std::fmt::Display for ToolInternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolInternalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ============================================================================
// Tool Trait - Core Tool Abstraction
// ============================================================================

/// Trait for implementing tools that can be executed by the agent loop.
///
/// # Example
///
/// ```ignore
/// struct Shout;
///
/// #[async_trait]
/// impl Tool for Shout {
///     fn name(&self) -> &str {
///         "shout"
///     }
///
///     fn description(&self) -> &str {
///         "Upper-case the given text"
///     }
///
///     fn parameters(&self) -> ToolParameters {
///         ToolParameters::object()
///             .required_property("text", PropertySchema::string("Text to shout"))
///     }
///
///     async fn execute(&self, arguments: Value) -> ToolExecutionResult {
///         match arguments.get("text").and_then(|v| v.as_str()) {
///             Some(text) => ToolExecutionResult::success(text.to_uppercase()),
///             None => ToolExecutionResult::tool_error("text must be a string"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's unique name.
    ///
    /// This name is used by the model to invoke the tool and must be unique
    /// within a ToolRegistry.
    fn name(&self) -> &str;

    /// Returns a description of what the tool does.
    fn description(&self) -> &str;

    /// Returns the schema for the tool's parameters.
    fn parameters(&self) -> ToolParameters;

    /// Execute the tool with the arguments of a tool call.
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;

    /// Convert this tool to its ToolDefinition.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

// ============================================================================
// ToolRegistry - Concurrent Collection of Tools
// ============================================================================

/// A thread-safe registry mapping tool names to tools.
///
/// Shared by reference (`Arc<ToolRegistry>`) across all requests. Readers
/// (lookup, listing, schema export) proceed concurrently; registration takes
/// the write lock.
///
/// # Example
///
/// ```ignore
/// let registry = ToolRegistry::builder()
///     .tool(CalculateTool::new(client.clone()))
///     .tool(PythonTool::new(client))
///     .build();
///
/// let schema = registry.export_schema();
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with the registry.
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register(&self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an Arc-wrapped tool
    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().insert(name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Check if a tool is registered
    pub fn has(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Snapshot of all tool definitions, sorted by name
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .read()
            .values()
            .map(|tool| tool.to_definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Snapshot of all tools in the backend's advertisement format
    pub fn export_schema(&self) -> Vec<ToolSchema> {
        self.list().into_iter().map(ToolSchema::from).collect()
    }

    /// Create a builder for fluent tool registration
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.list().into_iter().map(|d| d.name).collect();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

/// Builder for creating a ToolRegistry with a fluent API.
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
        }
    }

    /// Add a tool to the registry
    pub fn tool(self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    /// Build the registry
    pub fn build(self) -> ToolRegistry {
        self.registry
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RegistryToolExecutor - Dispatches tool calls against a registry
// ============================================================================

/// Executes tool calls by looking them up in a shared registry.
#[derive(Debug, Clone)]
pub struct RegistryToolExecutor {
    registry: Arc<ToolRegistry>,
    dispatch: ToolDispatch,
}

impl RegistryToolExecutor {
    /// Create a sequential executor over the registry
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            dispatch: ToolDispatch::Sequential,
        }
    }

    /// Set the dispatch strategy for batches
    pub fn with_dispatch(mut self, dispatch: ToolDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }
}

#[async_trait]
impl ToolExecutor for RegistryToolExecutor {
    async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&tool_call.name) else {
            warn!(
                tool_name = %tool_call.name,
                tool_call_id = %tool_call.id,
                "Unknown tool requested"
            );
            let message = format!("unknown tool: {}", tool_call.name);
            return ToolResult::failure(&tool_call.id, message);
        };

        debug!(tool_name = %tool_call.name, tool_call_id = %tool_call.id, "Executing tool");
        let result = tool.execute(tool_call.arguments.clone()).await;
        result.into_tool_result(&tool_call.id, &tool_call.name)
    }

    async fn execute_all(&self, tool_calls: &[ToolCall]) -> Vec<ToolResult> {
        match self.dispatch {
            ToolDispatch::Sequential => {
                let mut results = Vec::with_capacity(tool_calls.len());
                for tool_call in tool_calls {
                    results.push(self.execute(tool_call).await);
                }
                results
            }
            ToolDispatch::Concurrent => {
                join_all(tool_calls.iter().map(|tool_call| self.execute(tool_call))).await
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{EchoTool, FailingTool};
    use serde_json::json;

    #[test]
    fn test_tool_registry() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FailingTool::default());

        assert_eq!(registry.len(), 2);
        assert!(registry.has("echo"));
        assert!(registry.has("failing_tool"));
        assert!(!registry.has("nonexistent"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = ToolRegistry::builder()
            .tool(FailingTool::with_tool_error("first"))
            .tool(FailingTool::with_tool_error("second"))
            .build();

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_is_sorted_snapshot() {
        let registry = ToolRegistry::builder()
            .tool(FailingTool::default())
            .tool(EchoTool)
            .build();

        let snapshot = registry.list();
        let names: Vec<_> = snapshot.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "failing_tool"]);

        // Later registrations do not show up in an existing snapshot
        registry.register_arc(Arc::new(EchoTool));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_export_schema_wraps_definitions() {
        let registry = ToolRegistry::builder().tool(EchoTool).build();

        let schema = serde_json::to_value(registry.export_schema()).unwrap();
        assert_eq!(schema[0]["type"], "function");
        assert_eq!(schema[0]["function"]["name"], "echo");
        assert_eq!(schema[0]["function"]["parameters"]["required"], json!(["message"]));
    }

    #[test]
    fn test_execution_result_conversion() {
        let result = ToolExecutionResult::success("42").into_tool_result("call_1", "t");
        assert_eq!(result, ToolResult::success("call_1", "42"));

        let result =
            ToolExecutionResult::tool_error("Invalid input").into_tool_result("call_2", "t");
        assert_eq!(result, ToolResult::failure("call_2", "Invalid input"));

        let result = ToolExecutionResult::internal_error_msg("Secret database error")
            .into_tool_result("call_3", "t");
        assert_eq!(
            result.error.as_deref(),
            Some("An internal error occurred while executing the tool")
        );
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn test_executor_unknown_tool() {
        let executor = RegistryToolExecutor::new(Arc::new(ToolRegistry::new()));

        let result = executor
            .execute(&ToolCall::new("call_0", "foo", json!({})))
            .await;

        assert_eq!(result, ToolResult::failure("call_0", "unknown tool: foo"));
    }

    #[tokio::test]
    async fn test_executor_success_and_tool_error() {
        let registry = Arc::new(
            ToolRegistry::builder()
                .tool(EchoTool)
                .tool(FailingTool::with_tool_error("Something went wrong"))
                .build(),
        );
        let executor = RegistryToolExecutor::new(registry);

        let ok = executor
            .execute(&ToolCall::new("call_0", "echo", json!({"message": "hi"})))
            .await;
        assert_eq!(ok, ToolResult::success("call_0", "hi"));

        let failed = executor
            .execute(&ToolCall::new("call_1", "failing_tool", json!({})))
            .await;
        assert_eq!(failed, ToolResult::failure("call_1", "Something went wrong"));
    }

    #[tokio::test]
    async fn test_execute_all_preserves_order_and_length() {
        let registry = Arc::new(ToolRegistry::builder().tool(EchoTool).build());
        let calls: Vec<ToolCall> = (0..5)
            .map(|i| {
                let name = if i == 2 { "missing" } else { "echo" };
                ToolCall::new(format!("call_{i}"), name, json!({"message": format!("m{i}")}))
            })
            .collect();

        for dispatch in [ToolDispatch::Sequential, ToolDispatch::Concurrent] {
            let executor = RegistryToolExecutor::new(registry.clone()).with_dispatch(dispatch);
            let results = executor.execute_all(&calls).await;

            assert_eq!(results.len(), calls.len());
            for (call, result) in calls.iter().zip(&results) {
                assert_eq!(result.tool_call_id, call.id);
            }
            assert_eq!(results[0].content, "m0");
            assert_eq!(results[2].error.as_deref(), Some("unknown tool: missing"));
            assert_eq!(results[4].content, "m4");
        }
    }

    #[tokio::test]
    async fn test_execute_all_empty_batch() {
        let executor = RegistryToolExecutor::new(Arc::new(ToolRegistry::new()));
        assert!(executor.execute_all(&[]).await.is_empty());
    }
}
