// Tool listing route

use axum::{extract::State, routing::get, Json, Router};
use heyo_core::{ToolDefinition, ToolRegistry};
use std::sync::Arc;

/// App state for tool routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
}

/// Create tool routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/tools", get(list_tools))
        .with_state(state)
}

/// GET /api/tools - Registered tools, sorted by name
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.registry.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use heyo_core::memory::{EchoTool, FailingTool};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_tools() {
        let registry = Arc::new(
            ToolRegistry::builder()
                .tool(FailingTool::default())
                .tool(EchoTool)
                .build(),
        );
        let app = routes(AppState { registry });

        let response = app
            .oneshot(Request::builder().uri("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let tools: Value = serde_json::from_slice(&body).unwrap();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["echo", "failing_tool"]);
        assert_eq!(tools[0]["parameters"]["type"], "object");
    }
}
