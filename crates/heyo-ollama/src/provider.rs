// Ollama Chat Backend
//
// Production implementation of ChatBackend for Ollama's streaming chat API.
// One call is one `POST {base}/api/chat` with `stream: true`; the NDJSON
// body is handed to the loop chunk by chunk.

use async_trait::async_trait;
use heyo_core::{
    AgentLoopError, BackendChatRequest, BackendChunkStream, ChatBackend, Result,
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::ndjson::chunk_stream;
use crate::types::{OllamaChatRequest, OllamaMessage};

/// Default Ollama base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Bound on establishing the connection; the stream itself is unbounded
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ollama chat backend
///
/// # Example
///
/// ```ignore
/// use heyo_ollama::OllamaChatBackend;
///
/// let backend = OllamaChatBackend::new("http://localhost:11434")?;
/// let stream = backend.chat_stream(&request).await?;
/// ```
#[derive(Clone)]
pub struct OllamaChatBackend {
    client: Client,
    base_url: String,
    chat_url: String,
}

impl OllamaChatBackend {
    /// Create a backend for the Ollama instance at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AgentLoopError::config(format!("Ollama client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a backend with a preconfigured HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            chat_url: format!("{base_url}/api/chat"),
            base_url,
        }
    }

    /// Base URL of the Ollama instance
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the chat endpoint
    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    fn build_request(request: &BackendChatRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: true,
            tools: request.tools.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaChatBackend {
    async fn chat_stream(&self, request: &BackendChatRequest) -> Result<BackendChunkStream> {
        let body = Self::build_request(request);

        debug!(
            url = %self.chat_url,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat request to Ollama"
        );

        let response = self
            .client
            .post(&self.chat_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.chat_url, error = %e, "Ollama unreachable");
                AgentLoopError::unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_text, "Ollama returned an error status");
            let message = if error_text.trim().is_empty() {
                status.to_string()
            } else {
                error_text
            };
            return Err(AgentLoopError::backend(message));
        }

        Ok(chunk_stream(response.bytes_stream()))
    }
}

impl std::fmt::Debug for OllamaChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaChatBackend")
            .field("chat_url", &self.chat_url)
            .finish()
    }
}
