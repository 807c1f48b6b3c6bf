// Heyo API server
// Decision: One process serves the agent loop, the tool listing and a raw Ollama passthrough
// Decision: CORS is open to every origin; the server carries no credentials

mod chat;
mod config;
mod proxy;
mod tools;

use anyhow::{Context, Result};
use axum::{extract::State, http::header, http::Method, routing::get, Json, Router};
use heyo_core::{register_builtin_tools, AgentLoop, ToolRegistry};
use heyo_ollama::OllamaChatBackend;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    tools: usize,
}

async fn health(State(registry): State<Arc<ToolRegistry>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tools: registry.len(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "heyo_api=debug,heyo_core=info,heyo_ollama=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("heyo-api starting...");

    let config = ServerConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        ollama = %config.ollama_url,
        executor = %config.tools.execution_service_url,
        max_iterations = config.loop_config.max_iterations,
        dispatch = ?config.loop_config.tool_dispatch,
        "Configuration loaded"
    );

    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry, &config.tools).context("Failed to set up builtin tools")?;

    let backend = Arc::new(
        OllamaChatBackend::new(config.ollama_url.as_str())
            .context("Failed to create Ollama client")?,
    );
    let agent = Arc::new(AgentLoop::new(
        config.loop_config.clone(),
        backend,
        registry,
    ));

    let app = build_router(agent, &config.ollama_url);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Assemble every route with CORS and request tracing (extracted for testing)
fn build_router(agent: Arc<AgentLoop>, ollama_url: &str) -> Router {
    let registry = agent.registry().clone();
    Router::new()
        .route("/health", get(health).with_state(registry.clone()))
        .merge(chat::routes(chat::AppState::new(agent)))
        .merge(tools::routes(tools::AppState { registry }))
        .merge(proxy::routes(proxy::AppState::new(ollama_url)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
}
