//! Ollama integration: HTTP transport and client configuration.
//!
//! The relay core stays transport-agnostic; everything that knows about the
//! `/api/chat` endpoint lives here.
mod adapter;
mod config;

pub use adapter::OllamaTransport;
pub use config::OllamaClientConfig;
