//! `calculate` tool
//!
//! Delegates to the execution service. When the service cannot be reached the
//! expression is evaluated in-process by the restricted evaluator in
//! [`super::math_eval`], which only knows a fixed set of math names.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::execution_service::{ExecutionServiceClient, ExecutionServiceError};
use super::math_eval;
use crate::tool_types::{PropertySchema, ToolParameters};
use crate::tools::{Tool, ToolExecutionResult};

/// Evaluates mathematical expressions
pub struct CalculateTool {
    service: ExecutionServiceClient,
}

impl CalculateTool {
    pub fn new(service: ExecutionServiceClient) -> Self {
        Self { service }
    }

    fn evaluate_locally(expression: &str) -> ToolExecutionResult {
        match math_eval::evaluate(expression) {
            Ok(value) => ToolExecutionResult::success(value.to_string()),
            Err(e) => ToolExecutionResult::tool_error(format!("execution error: {e}")),
        }
    }
}

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate mathematical expressions accurately. Use this for ANY math calculations including arithmetic, algebra, trigonometry, logarithms, square roots, etc. Always use this tool instead of calculating yourself."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::object().required_property(
            "expression",
            PropertySchema::string(
                "Mathematical expression to evaluate, e.g., 'sqrt(189)', '2+2*3', 'sin(3.14159/2)', 'log(100, 10)'",
            ),
        )
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(expression) = arguments.get("expression").and_then(|v| v.as_str()) else {
            return ToolExecutionResult::tool_error("expression must be a string");
        };

        match self
            .service
            .execute(self.name(), &json!({ "expression": expression }))
            .await
        {
            Ok(result) => ToolExecutionResult::success(result),
            Err(e) if e.is_unreachable() => {
                warn!(error = %e, "Execution service unreachable, evaluating expression locally");
                Self::evaluate_locally(expression)
            }
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
    use crate::config::BuiltinToolsConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn offline_tool() -> CalculateTool {
        CalculateTool::new(
            ExecutionServiceClient::new(&BuiltinToolsConfig::new("http://127.0.0.1:1")).unwrap(),
        )
    }

    #[test]
    fn test_schema() {
        let tool = offline_tool();
        let definition = tool.to_definition();
        assert_eq!(definition.name, "calculate");
        assert_eq!(definition.parameters.required, vec!["expression".to_string()]);
    }

    #[tokio::test]
    async fn test_uses_service_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "result": "4"})),
            )
            .mount(&server)
            .await;

        let tool = CalculateTool::new(
            ExecutionServiceClient::new(&BuiltinToolsConfig::new(server.uri())).unwrap(),
        );
        let result = tool.execute(json!({"expression": "2+2"})).await;

        assert!(matches!(result, ToolExecutionResult::Success(ref s) if s == "4"));
    }

    #[tokio::test]
    async fn test_service_failure_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"success": false, "error": "division by zero"}),
            ))
            .mount(&server)
            .await;

        let tool = CalculateTool::new(
            ExecutionServiceClient::new(&BuiltinToolsConfig::new(server.uri())).unwrap(),
        );
        let result = tool.execute(json!({"expression": "1/0"})).await;

        assert!(matches!(result, ToolExecutionResult::ToolError(ref s) if s == "division by zero"));
    }

    #[tokio::test]
    async fn test_local_fallback_when_service_unreachable() {
        let result = offline_tool().execute(json!({"expression": "sqrt(189)"})).await;
        assert!(matches!(result, ToolExecutionResult::Success(ref s) if s == "13.74772708486752"));
    }

    #[tokio::test]
    async fn test_local_fallback_rejects_unlisted_names() {
        let result = offline_tool()
            .execute(json!({"expression": "system(1)"}))
            .await;
        assert!(matches!(
            result,
            ToolExecutionResult::ToolError(ref s) if s == "execution error: Unknown function: system"
        ));
    }

    #[tokio::test]
    async fn test_missing_expression() {
        let result = offline_tool().execute(json!({"expression": 4})).await;
        assert!(matches!(
            result,
            ToolExecutionResult::ToolError(ref s) if s == "expression must be a string"
        ));
    }
}
