// Chat HTTP route
//
// POST /api/chat (alias /chat) runs the agent loop for one conversation and
// streams its events back as NDJSON. The loop runs in its own task and
// writes into a bounded channel; the response body drains that channel.
// When the client disconnects the body is dropped, the channel closes and
// the loop stops at its next suspension point.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use futures::StreamExt;
use heyo_core::memory::ChannelEventEmitter;
use heyo_core::{AgentLoop, ChatRequest, StreamEvent};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

/// Events buffered between the loop and a slow client
const EVENT_BUFFER: usize = 64;

/// App state for chat routes
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<AgentLoop>,
}

impl AppState {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self { agent }
    }
}

/// Create chat routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat).options(preflight))
        .route("/chat", post(chat).options(preflight))
        .with_state(state)
}

/// OPTIONS without CORS request headers; real preflights are answered by the CORS layer
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// POST /api/chat - Run the agent loop and stream NDJSON events
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, StatusCode> {
    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Rejecting malformed chat request");
        StatusCode::BAD_REQUEST
    })?;

    if request.messages.is_empty() {
        tracing::debug!("Rejecting chat request without messages");
        return Err(StatusCode::BAD_REQUEST);
    }

    let request_id = Uuid::now_v7();
    let span = tracing::info_span!("chat", request_id = %request_id, model = %request.model);

    let (emitter, rx) = ChannelEventEmitter::channel(EVENT_BUFFER);
    let agent = state.agent.clone();
    tokio::spawn(
        async move {
            match agent.run(request, &emitter).await {
                Ok(outcome) => tracing::debug!(
                    iterations = outcome.iterations,
                    stop = ?outcome.stop,
                    "Chat request finished"
                ),
                Err(e) if e.is_cancelled() => tracing::info!("Client disconnected"),
                Err(e) => tracing::warn!(error = %e, "Chat request failed"),
            }
        }
        .instrument(span),
    );

    let stream = ReceiverStream::new(rx)
        .map(|event: StreamEvent| Ok::<_, Infallible>(event.to_ndjson()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Request-Id", request_id.to_string())
        .body(Body::from_stream(stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
