use futures::StreamExt as _;
use tracing::debug;

use crate::errors::{ClientError, RelayError};
use crate::transport::{ByteStream, ChatRequest, ChatTransport};

use super::config::OllamaClientConfig;

/// Chat transport for Ollama's streaming `/api/chat` endpoint.
pub struct OllamaTransport {
    client: reqwest::Client,
    config: OllamaClientConfig,
}

impl OllamaTransport {
    /// Creates a transport from explicit client configuration.
    pub fn new(config: OllamaClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build Ollama client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport using `OLLAMA_HOST` / `OLLAMA_MODEL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(OllamaClientConfig::from_env()?)
    }

    pub fn config(&self) -> &OllamaClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl ChatTransport for OllamaTransport {
    async fn open(&self, request: ChatRequest) -> Result<ByteStream, RelayError> {
        let body = build_request_body(&request, &self.config);
        debug!(request_id = %request.request_id, model = %self.config.model, messages = request.messages.len(), "starting Ollama chat stream");

        // Any failure before a response head arrives is reported the same way.
        let response = self
            .client
            .post(self.config.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::connection_unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let detail = server_error_text(&body).unwrap_or(body);
            return Err(RelayError::http_status(
                status.as_u16(),
                format!("chat request failed with status {status}: {detail}"),
            ));
        }

        let request_id = request.request_id;
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                debug!(request_id = %request_id, error = %e, "Ollama body read failed");
                map_read_error(&e)
            })
        });
        Ok(Box::pin(stream))
    }
}

pub(crate) fn build_request_body(
    request: &ChatRequest,
    config: &OllamaClientConfig,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": config.model,
        "messages": request.messages,
        "stream": true,
    });
    if let Some(keep_alive) = config.keep_alive.as_ref() {
        body["keep_alive"] = serde_json::json!(keep_alive);
    }
    body
}

fn map_read_error(err: &reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::transport(format!("response read timed out: {err}"))
    } else {
        RelayError::Truncated { discarded_bytes: 0 }
    }
}

fn server_error_text(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn request_body_streams_full_history() {
        let history = vec![Message::user("hi"), Message::user("there")];
        let request = ChatRequest::new(uuid::Uuid::new_v4(), &history);
        let body = build_request_body(&request, &OllamaClientConfig::new("llama3.2"));
        assert_eq!(body.get("stream").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(body.get("model").and_then(|v| v.as_str()), Some("llama3.2"));
        assert_eq!(
            body.get("messages").and_then(|v| v.as_array()).map(Vec::len),
            Some(2)
        );
        assert!(body.get("keep_alive").is_none());
    }

    #[test]
    fn keep_alive_is_sent_when_configured() {
        let request = ChatRequest::new(uuid::Uuid::new_v4(), &[Message::user("hi")]);
        let body = build_request_body(&request, &OllamaClientConfig::new("m").keep_alive("5m"));
        assert_eq!(body.get("keep_alive").and_then(|v| v.as_str()), Some("5m"));
    }

    #[test]
    fn server_error_text_reads_error_field() {
        assert_eq!(
            server_error_text(r#"{"error":"model \"x\" not found, try pulling it first"}"#)
                .as_deref(),
            Some("model \"x\" not found, try pulling it first")
        );
        assert_eq!(server_error_text("plain text"), None);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = OllamaTransport::new(OllamaClientConfig::new(""));
        assert!(matches!(result, Err(ClientError::Config(_))));
    }
}
