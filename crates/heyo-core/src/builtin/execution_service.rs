// Client for the external execution service
//
// Both builtin tools delegate to `POST {service}/execute` with a body of
// `{"tool": <name>, "args": {...}}` and expect `{success, result, error}`.
// Failures are classified so the tools can decide between falling back to
// local execution and reporting an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::BuiltinToolsConfig;
use crate::error::AgentLoopError;

/// Ways a delegated execution can fail
#[derive(Debug, Error)]
pub enum ExecutionServiceError {
    /// The service could not be reached at all; callers may fall back
    #[error("execution service unreachable: {0}")]
    Unreachable(String),

    /// The service accepted the call but did not answer in time
    #[error("execution service timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with something that is not an execution result
    #[error("invalid execution service response: {0}")]
    InvalidResponse(String),

    /// The service ran the tool and reported a failure
    #[error("{0}")]
    Failed(String),
}

impl ExecutionServiceError {
    /// Whether local fallback execution should be attempted
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ExecutionServiceError::Unreachable(_))
    }
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    tool: &'a str,
    args: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    success: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error: String,
}

/// HTTP client for the execution service, shared by the builtin tools
#[derive(Debug, Clone)]
pub struct ExecutionServiceClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ExecutionServiceClient {
    /// Create a client from the builtin tools configuration
    pub fn new(config: &BuiltinToolsConfig) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentLoopError::config(format!("execution service client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/execute",
                config.execution_service_url.trim_end_matches('/')
            ),
            timeout: config.timeout,
        })
    }

    /// The full URL calls are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a tool on the service and return its textual result
    pub async fn execute(&self, tool: &str, args: &Value) -> Result<String, ExecutionServiceError> {
        debug!(tool = %tool, endpoint = %self.endpoint, "Delegating to execution service");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&ExecuteRequest { tool, args })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body: ExecuteResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ExecutionServiceError::Timeout(self.timeout)
            } else {
                ExecutionServiceError::InvalidResponse(e.to_string())
            }
        })?;

        if body.success {
            Ok(body.result)
        } else {
            Err(ExecutionServiceError::Failed(body.error))
        }
    }

    fn classify(&self, error: reqwest::Error) -> ExecutionServiceError {
        if error.is_timeout() {
            ExecutionServiceError::Timeout(self.timeout)
        } else {
            ExecutionServiceError::Unreachable(error.to_string())
        }
    }
}
