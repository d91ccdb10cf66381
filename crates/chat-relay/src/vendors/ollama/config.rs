use std::time::Duration;

use crate::errors::ClientError;

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub(crate) const DEFAULT_MODEL: &str = "llama3.2";

/// Configuration for the Ollama chat transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaClientConfig {
    /// Base URL of the local model server.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Upper bound on an entire request, body included. `None` waits forever,
    /// which suits slow local models.
    pub request_timeout: Option<Duration>,
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// How long the server keeps the model loaded after the request
    /// (for example `"5m"`, `"0"`, `"-1"`).
    pub keep_alive: Option<String>,
}

impl Default for OllamaClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
            connect_timeout: Duration::from_secs(5),
            keep_alive: None,
        }
    }
}

impl OllamaClientConfig {
    /// Creates a config with local defaults for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `OLLAMA_HOST` and `OLLAMA_MODEL`, falling back to
    /// local defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("OLLAMA_HOST")
            && !host.trim().is_empty()
        {
            config.base_url = normalize_host(&host);
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL")
            && !model.trim().is_empty()
        {
            config.model = model.trim().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL. A bare `host:port` gets an `http://` scheme.
    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = normalize_host(base_url.as_ref());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Config("Ollama base_url must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ClientError::Config("Ollama model must not be empty".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::Config(
                "connect_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_server() {
        let config = OllamaClientConfig::default();
        assert_eq!(config.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(config.model, "llama3.2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bare_host_gets_scheme_and_trailing_slash_is_trimmed() {
        let config = OllamaClientConfig::new("m").base_url("127.0.0.1:9999/");
        assert_eq!(config.chat_url(), "http://127.0.0.1:9999/api/chat");
        let config = OllamaClientConfig::new("m").base_url("https://gpu-box:11434");
        assert_eq!(config.chat_url(), "https://gpu-box:11434/api/chat");
    }

    #[test]
    fn validate_rejects_empty_model_and_zero_connect_timeout() {
        let err = OllamaClientConfig::new("  ").validate().expect_err("empty model");
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("model")));
        let err = OllamaClientConfig::new("m")
            .connect_timeout(Duration::ZERO)
            .validate()
            .expect_err("zero timeout");
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("connect_timeout")));
    }
}
