// Builtin tools
//
// `calculate` and `python`, both backed by the external execution service
// with a local fallback when the service cannot be reached.

mod calculator;
mod execution_service;
pub mod math_eval;
mod python;

pub use calculator::CalculateTool;
pub use execution_service::{ExecutionServiceClient, ExecutionServiceError};
pub use python::{LocalInterpreter, PythonTool};

use tracing::{info, warn};

use crate::config::BuiltinToolsConfig;
use crate::error::Result;
use crate::tools::ToolRegistry;

/// Register the builtin tools with a registry
pub fn register_builtin_tools(registry: &ToolRegistry, config: &BuiltinToolsConfig) -> Result<()> {
    let service = ExecutionServiceClient::new(config)?;

    if config.allow_insecure_code_fallback {
        warn!(
            python_bin = %config.python_bin,
            "Insecure local code fallback enabled: python tool may run unsandboxed code"
        );
    }

    registry.register(CalculateTool::new(service.clone()));
    registry.register(PythonTool::from_config(service, config));

    info!(
        execution_service = %config.execution_service_url,
        tools = registry.len(),
        "Registered builtin tools"
    );
    Ok(())
}
