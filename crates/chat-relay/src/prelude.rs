//! Common imports for typical relay usage.
pub use crate::{
    CancelHandle, ChatSession, ChatTransport, ClientError, CompletionStats, Conversation, Message,
    MessageId, PendingTurn, RelayCallbacks, RelayError, RelayEvent, RelayListener, RelayOutcome,
    RelayRun, Role, StreamRelay, StreamStatus,
};
