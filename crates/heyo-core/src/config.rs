// Loop configuration
//
// LoopConfig is a transport-agnostic configuration struct. The API server
// builds one from environment variables; tests build one directly.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AgentLoopError;

/// System prompt inserted when the client conversation carries none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Heyo, a helpful AI assistant. You have access to tools that you MUST use when appropriate:

1. **calculate**: Use this for ANY mathematical calculation. NEVER calculate math yourself - always use this tool.
2. **python**: Use this to execute Python code for complex tasks or computations.

IMPORTANT: When you receive a tool result, you MUST use the EXACT value returned. Do NOT round, approximate, or modify the result. Simply report the exact number from the tool.

Example:
- Tool returns: 13.74772708486752
- You say: \"The square root of 189 is 13.74772708486752\"
- Do NOT say: \"approximately 13.75\" or round the number";

/// How the tool calls of a single turn are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDispatch {
    /// One call after another, in the order the backend emitted them
    #[default]
    Sequential,
    /// All calls of a turn at once, results still collected in input order
    Concurrent,
}

impl FromStr for ToolDispatch {
    type Err = AgentLoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ToolDispatch::Sequential),
            "concurrent" => Ok(ToolDispatch::Concurrent),
            other => Err(AgentLoopError::config(format!(
                "unknown tool dispatch mode: {other}"
            ))),
        }
    }
}

/// Configuration for the agent loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// System prompt prepended when the conversation has no system message
    pub system_prompt: String,

    /// Maximum number of backend turns per request (prevents infinite loops)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Dispatch strategy for the tool calls of one turn
    #[serde(default)]
    pub tool_dispatch: ToolDispatch,
}

fn default_max_iterations() -> usize {
    10
}

impl LoopConfig {
    /// Create a configuration with the default prompt and iteration cap
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the tool dispatch strategy
    pub fn with_tool_dispatch(mut self, tool_dispatch: ToolDispatch) -> Self {
        self.tool_dispatch = tool_dispatch;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: default_max_iterations(),
            tool_dispatch: ToolDispatch::default(),
        }
    }
}

/// Configuration shared by the builtin tools
#[derive(Debug, Clone)]
pub struct BuiltinToolsConfig {
    /// Base URL of the external execution service
    pub execution_service_url: String,

    /// Bound on a single execution-service call (and on the local interpreter)
    pub timeout: Duration,

    /// Run submitted code with a local interpreter when the service is down.
    /// This executes untrusted code without any sandbox.
    pub allow_insecure_code_fallback: bool,

    /// Interpreter used by the insecure fallback
    pub python_bin: String,
}

impl BuiltinToolsConfig {
    /// Create a configuration pointing at the given execution service
    pub fn new(execution_service_url: impl Into<String>) -> Self {
        Self {
            execution_service_url: execution_service_url.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the unsandboxed local code fallback
    pub fn with_insecure_code_fallback(mut self, allow: bool) -> Self {
        self.allow_insecure_code_fallback = allow;
        self
    }

    /// Set the interpreter used by the local fallback
    pub fn with_python_bin(mut self, python_bin: impl Into<String>) -> Self {
        self.python_bin = python_bin.into();
        self
    }
}

impl Default for BuiltinToolsConfig {
    fn default() -> Self {
        Self {
            execution_service_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(30),
            allow_insecure_code_fallback: false,
            python_bin: "python3".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.tool_dispatch, ToolDispatch::Sequential);
        assert!(config.system_prompt.contains("calculate"));
    }

    #[test]
    fn test_loop_config_builder() {
        let config = LoopConfig::new()
            .with_system_prompt("be brief")
            .with_max_iterations(3)
            .with_tool_dispatch(ToolDispatch::Concurrent);

        assert_eq!(config.system_prompt, "be brief");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.tool_dispatch, ToolDispatch::Concurrent);
    }

    #[test]
    fn test_tool_dispatch_from_str() {
        assert_eq!(
            "Concurrent".parse::<ToolDispatch>().unwrap(),
            ToolDispatch::Concurrent
        );
        assert_eq!(
            " sequential ".parse::<ToolDispatch>().unwrap(),
            ToolDispatch::Sequential
        );
        assert!("parallel".parse::<ToolDispatch>().is_err());
    }

    #[test]
    fn test_builtin_tools_config_defaults() {
        let config = BuiltinToolsConfig::new("http://executor:9000");
        assert_eq!(config.execution_service_url, "http://executor:9000");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.allow_insecure_code_fallback);
        assert_eq!(config.python_bin, "python3");
    }
}
