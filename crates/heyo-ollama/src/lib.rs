// Ollama Backend Implementation
//
// This crate provides the Ollama chat backend. It implements the ChatBackend
// trait from heyo-core, enabling the agent loop to stream turns from Ollama's
// `/api/chat` endpoint.

mod ndjson;
mod provider;
mod types;


pub use provider::{OllamaChatBackend, DEFAULT_BASE_URL};
pub use types::{OllamaChatRequest, OllamaMessage, OllamaStreamLine};

// Re-export core types for convenience
pub use heyo_core::traits::ChatBackend;
