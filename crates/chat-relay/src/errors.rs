/// Fixed message shown when the model server cannot be reached at all.
pub const CONNECTION_UNAVAILABLE_MESSAGE: &str = "Unable to connect to Ollama. Please check that the Ollama app is running on your computer and try again. If the problem persists, try restarting Ollama.";

/// Failures of a single relay request.
///
/// Every variant except `Cancelled` is reported through exactly one error
/// callback. `Cancelled` is caller-initiated and suppresses callbacks instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The server could not be reached (refused, DNS, connect timeout).
    #[error("model server unavailable: {detail}")]
    ConnectionUnavailable { detail: String },
    /// The stream closed before the final frame was received.
    #[error("stream closed before the final frame was received")]
    Truncated {
        /// Bytes of an unterminated line that were dropped on close.
        discarded_bytes: usize,
    },
    /// A line could not be classified as a partial or final frame.
    #[error("malformed frame ({reason}): {line}")]
    MalformedFrame { line: String, reason: String },
    /// Generic transport or I/O failure.
    #[error("transport error: {message}")]
    TransportError {
        message: String,
        status_code: Option<u16>,
    },
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn connection_unavailable(detail: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            detail: detail.into(),
        }
    }

    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            line: line.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn http_status(status_code: u16, message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Human-readable text handed to the error callback.
    pub fn user_message(&self) -> String {
        match self {
            Self::ConnectionUnavailable { .. } => CONNECTION_UNAVAILABLE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors raised before a relay request exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client or relay configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input to a start/submit call.
    #[error("validation error: {0}")]
    Validation(String),
}
