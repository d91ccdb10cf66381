use std::pin::Pin;

use crate::errors::RelayError;
use crate::message::{Message, Role};

/// Response body as delivered by the network layer, in arbitrary chunks.
///
/// A transport maps read failures into `RelayError`: an abnormal close
/// surfaces as `Truncated`, any other I/O failure as `TransportError`.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, RelayError>> + Send + 'static>>;

/// One chat message as sent on the wire.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Request issued by the relay for one conversation turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    pub request_id: uuid::Uuid,
    /// Full conversation history in log order.
    pub messages: Vec<WireMessage>,
}

impl ChatRequest {
    pub fn new(request_id: uuid::Uuid, history: &[Message]) -> Self {
        Self {
            request_id,
            messages: history.iter().map(WireMessage::from).collect(),
        }
    }
}

/// Opens the response stream for a chat request.
///
/// Returning `Ok` means the response head arrived and the body is ready to be
/// read. Failures to reach the server are `ConnectionUnavailable`.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: ChatRequest) -> Result<ByteStream, RelayError>;
}
