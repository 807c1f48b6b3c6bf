//! `python` tool
//!
//! Runs code on the execution service. The local fallback starts the
//! configured interpreter as a child process with no isolation at all, so it
//! only exists when `allow_insecure_code_fallback` is set.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::execution_service::{ExecutionServiceClient, ExecutionServiceError};
use crate::config::BuiltinToolsConfig;
use crate::tool_types::{PropertySchema, ToolParameters};
use crate::tools::{Tool, ToolExecutionResult};

/// Unsandboxed local interpreter used when the service is down
#[derive(Debug, Clone)]
pub struct LocalInterpreter {
    python_bin: String,
    timeout: Duration,
}

impl LocalInterpreter {
    pub fn new(python_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout,
        }
    }

    /// Run `code` with `-c`; the child is killed if the future is dropped
    pub async fn run(&self, code: &str) -> ToolExecutionResult {
        let mut cmd = Command::new(&self.python_bin);
        cmd.arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(python_bin = %self.python_bin, "Running code with local interpreter");

        match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                ToolExecutionResult::success(String::from_utf8_lossy(&output.stdout).trim())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = match stderr.trim() {
                    "" => output.status.to_string(),
                    trimmed => trimmed.to_string(),
                };
                ToolExecutionResult::tool_error(format!("execution error: {message}"))
            }
            Ok(Err(e)) => ToolExecutionResult::tool_error(format!("execution error: {e}")),
            Err(_) => ToolExecutionResult::tool_error(format!(
                "execution error: timed out after {:?}",
                self.timeout
            )),
        }
    }
}

/// Executes Python code
pub struct PythonTool {
    service: ExecutionServiceClient,
    fallback: Option<LocalInterpreter>,
}

impl PythonTool {
    pub fn new(service: ExecutionServiceClient) -> Self {
        Self {
            service,
            fallback: None,
        }
    }

    /// Build the tool, enabling the local fallback only when configured
    pub fn from_config(service: ExecutionServiceClient, config: &BuiltinToolsConfig) -> Self {
        let tool = Self::new(service);
        if config.allow_insecure_code_fallback {
            tool.with_fallback(LocalInterpreter::new(&config.python_bin, config.timeout))
        } else {
            tool
        }
    }

    pub fn with_fallback(mut self, fallback: LocalInterpreter) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &str {
        "python"
    }

    fn description(&self) -> &str {
        "Execute Python code and return the output. Use for complex calculations, data processing, or any task that benefits from code execution. The code runs in a sandboxed environment with common libraries available (math, numpy, etc)."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::object().required_property(
            "code",
            PropertySchema::string("Python code to execute. Use print() to output results."),
        )
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(code) = arguments.get("code").and_then(|v| v.as_str()) else {
            return ToolExecutionResult::tool_error("code must be a string");
        };

        match self.service.execute(self.name(), &json!({ "code": code })).await {
            Ok(result) => ToolExecutionResult::success(result),
            Err(e) if e.is_unreachable() => match &self.fallback {
                Some(interpreter) => {
                    warn!(
                        error = %e,
                        "Execution service unreachable, running code with local interpreter (insecure)"
                    );
                    interpreter.run(code).await
                }
                None => ToolExecutionResult::tool_error(
                    "execution service unreachable and local code execution is disabled",
                ),
            },
            Err(ExecutionServiceError::InvalidResponse(message)) => {
                ToolExecutionResult::internal_error_msg(message)
            }
            Err(e) => ToolExecutionResult::tool_error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_service() -> ExecutionServiceClient {
        ExecutionServiceClient::new(&BuiltinToolsConfig::new("http://127.0.0.1:1")).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_disabled_by_default() {
        let tool = PythonTool::from_config(offline_service(), &BuiltinToolsConfig::default());
        let result = tool.execute(json!({"code": "print(1)"})).await;

        assert!(matches!(
            result,
            ToolExecutionResult::ToolError(ref s)
                if s == "execution service unreachable and local code execution is disabled"
        ));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let tool = PythonTool::new(offline_service());
        let result = tool.execute(json!({})).await;
        assert!(
            matches!(result, ToolExecutionResult::ToolError(ref s) if s == "code must be a string")
        );
    }

    #[tokio::test]
    async fn test_fallback_spawn_failure_is_execution_error() {
        let tool = PythonTool::new(offline_service()).with_fallback(LocalInterpreter::new(
            "/nonexistent/heyo-python",
            Duration::from_secs(1),
        ));
        let result = tool.execute(json!({"code": "print(1)"})).await;

        assert!(matches!(
            result,
            ToolExecutionResult::ToolError(ref s) if s.starts_with("execution error:")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_interpreter_captures_stdout_and_stderr() {
        // `sh -c` stands in for the interpreter: same calling convention
        let interpreter = LocalInterpreter::new("sh", Duration::from_secs(5));

        let ok = interpreter.run("echo '  hello  '").await;
        assert!(matches!(ok, ToolExecutionResult::Success(ref s) if s == "hello"));

        let failed = interpreter.run("echo oops >&2; exit 3").await;
        assert!(matches!(
            failed,
            ToolExecutionResult::ToolError(ref s) if s == "execution error: oops"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_interpreter_timeout() {
        let interpreter = LocalInterpreter::new("sh", Duration::from_millis(100));
        let result = interpreter.run("sleep 5").await;
        assert!(matches!(result, ToolExecutionResult::ToolError(ref s) if s.contains("timed out")));
    }
}
