//! Streaming chat relay for a local Ollama server.
//!
//! A [`StreamRelay`] sends the conversation history to the chat endpoint,
//! splits the newline-delimited JSON response into frames as bytes arrive, and
//! delivers incremental content followed by exactly one terminal event. A
//! [`ChatSession`] accumulates that content into the assistant message of the
//! turn in progress.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_relay::prelude::*;
//! use chat_relay::vendors::ollama::{OllamaClientConfig, OllamaTransport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let transport = OllamaTransport::new(OllamaClientConfig::new("llama3.2"))?;
//! let mut session = ChatSession::new(StreamRelay::new(Arc::new(transport)));
//!
//! let mut printer = RelayCallbacks::new(
//!     |text: &str| print!("{text}"),
//!     |message: &str| eprintln!("{message}"),
//!     || println!(),
//! );
//! let outcome = session
//!     .begin_turn("Say hello")?
//!     .complete_with(&mut printer)
//!     .await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

/// Conversation log accumulation and turn submission.
pub mod accumulator;
/// Classification of frames into partial and final.
pub mod classifier;
/// Public error types.
pub mod errors;
/// Incremental newline-delimited framing of a byte stream.
pub mod frame;
/// Conversation messages and the ordered log.
pub mod message;
/// Logging setup.
pub mod observability;
/// Relay tuning options.
pub mod options;
/// Common imports for typical usage.
pub mod prelude;
/// Request lifecycle, event delivery and cancellation.
pub mod relay;
/// Transport contract between the relay and a chat server.
pub mod transport;
/// Vendor-specific transports.
pub mod vendors;

pub use accumulator::{ChatSession, MessageAccumulator, PendingTurn, StreamStatus};
pub use classifier::{CompletionStats, FinalFrame, Frame, PartialFrame, classify_line};
pub use errors::{CONNECTION_UNAVAILABLE_MESSAGE, ClientError, RelayError};
pub use frame::{LineDecoder, frame_lines};
pub use message::{Conversation, Message, MessageId, Role};
pub use observability::{LogSettings, init_observability};
pub use options::RelayOptions;
pub use relay::{
    CancelHandle, RelayCallbacks, RelayEvent, RelayListener, RelayOutcome, RelayRun, RelayState,
    StreamRelay,
};
pub use transport::{ByteStream, ChatRequest, ChatTransport, WireMessage};
