// Server configuration
//
// Everything is read from the environment once at startup (after .env is
// loaded). Invalid values fail startup instead of silently using defaults.

use heyo_core::{AgentLoopError, BuiltinToolsConfig, LoopConfig, Result, ToolDispatch};
use heyo_ollama::DEFAULT_BASE_URL;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_EXECUTOR_URL: &str = "http://localhost:8002";

/// Configuration of the API server process
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub ollama_url: String,
    pub loop_config: LoopConfig,
    pub tools: BuiltinToolsConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| {
                    AgentLoopError::config(format!("PORT must be a port number, got {raw:?}"))
                })?,
            None => DEFAULT_PORT,
        };

        let mut loop_config = LoopConfig::default();
        if let Some(raw) = var("MAX_TOOL_ITERATIONS") {
            let max = raw.trim().parse::<usize>().ok().filter(|max| *max >= 1).ok_or_else(|| {
                AgentLoopError::config(format!(
                    "MAX_TOOL_ITERATIONS must be a positive integer, got {raw:?}"
                ))
            })?;
            loop_config = loop_config.with_max_iterations(max);
        }
        if let Some(raw) = var("TOOL_DISPATCH") {
            loop_config = loop_config.with_tool_dispatch(raw.parse::<ToolDispatch>()?);
        }

        let mut tools = BuiltinToolsConfig::new(
            var("PYTHON_EXECUTOR_URL").unwrap_or_else(|| DEFAULT_EXECUTOR_URL.to_string()),
        )
        .with_insecure_code_fallback(
            var("ALLOW_INSECURE_CODE_FALLBACK").is_some_and(|raw| is_truthy(&raw)),
        );
        if let Some(python_bin) = var("PYTHON_BIN") {
            tools = tools.with_python_bin(python_bin);
        }

        Ok(Self {
            port,
            ollama_url: var("OLLAMA_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            loop_config,
            tools,
        })
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
