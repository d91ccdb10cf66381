//! Consumer side of the relay: appends streamed content into the conversation
//! log and tracks the indicators a presentation layer renders.

use tracing::warn;

use crate::errors::ClientError;
use crate::message::{Conversation, Message, MessageId};
use crate::relay::{
    CancelHandle, RelayListener, RelayOutcome, RelayRun, RelayState, StreamRelay,
};

/// Indicators for the turn in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamStatus {
    /// True from submission until the first content arrives or the turn fails.
    pub loading: bool,
    /// False while a turn is streaming.
    pub stream_complete: bool,
    /// Error text of the last failed turn. Cleared when a new turn starts.
    pub error: Option<String>,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self {
            loading: false,
            stream_complete: true,
            error: None,
        }
    }
}

impl StreamStatus {
    /// Whether a new turn may be submitted.
    pub fn can_submit(&self) -> bool {
        !self.loading && self.stream_complete
    }

    fn begin(&mut self) {
        self.error = None;
        self.loading = true;
        self.stream_complete = false;
    }

    fn settle(&mut self) {
        self.loading = false;
        self.stream_complete = true;
    }
}

/// Appends the content of one relay run to a single assistant message.
///
/// Creating the accumulator appends the empty assistant placeholder, so the
/// message exists before any content can be delivered.
pub struct MessageAccumulator<'a> {
    conversation: &'a mut Conversation,
    status: &'a mut StreamStatus,
    message_id: MessageId,
}

impl<'a> MessageAccumulator<'a> {
    pub fn begin(conversation: &'a mut Conversation, status: &'a mut StreamStatus) -> Self {
        let message_id = MessageId::new();
        conversation.push(Message::assistant_placeholder(message_id));
        status.begin();
        Self {
            conversation,
            status,
            message_id,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        self.conversation
            .get(self.message_id)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// Clears the in-progress indicators after a caller-initiated cancel. The
    /// partial message is kept.
    pub fn cancelled(&mut self) {
        self.status.settle();
    }
}

impl RelayListener for MessageAccumulator<'_> {
    fn on_content(&mut self, text: &str) {
        self.status.loading = false;
        if !self.conversation.append(self.message_id, text) {
            warn!(message_id = %self.message_id, "assistant message missing from conversation; dropping content");
        }
    }

    fn on_error(&mut self, message: &str) {
        self.status.settle();
        self.status.error = Some(message.to_string());
    }

    fn on_complete(&mut self) {
        self.status.settle();
    }
}

/// A conversation bound to a relay: submits user turns and accumulates the
/// streamed replies.
pub struct ChatSession {
    relay: StreamRelay,
    conversation: Conversation,
    status: StreamStatus,
    system_prompt: Option<String>,
}

impl ChatSession {
    pub fn new(relay: StreamRelay) -> Self {
        Self {
            relay,
            conversation: Conversation::new(),
            status: StreamStatus::default(),
            system_prompt: None,
        }
    }

    /// Sets a system prompt sent ahead of the history on every turn. It is not
    /// part of the displayed conversation.
    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt = Some(text.into()).filter(|s| !s.trim().is_empty());
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    /// Starts a new chat.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.status = StreamStatus::default();
    }

    /// Appends the user message, starts the relay with the full history and
    /// appends the assistant placeholder.
    ///
    /// Blank input is rejected. The returned turn borrows the session, so
    /// turns are serialized.
    pub fn begin_turn(&mut self, text: &str) -> Result<PendingTurn<'_>, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }
        let user = Message::user(text);

        let mut history = Vec::with_capacity(self.conversation.len() + 2);
        if let Some(system) = self.system_prompt.as_ref() {
            history.push(Message::system(system.clone()));
        }
        history.extend(self.conversation.messages().iter().cloned());
        history.push(user.clone());

        let run = self.relay.start(&history)?;
        self.conversation.push(user);
        let accumulator = MessageAccumulator::begin(&mut self.conversation, &mut self.status);
        Ok(PendingTurn { run, accumulator })
    }
}

/// A submitted turn whose reply is still streaming.
///
/// Dropping it before the reply settles cancels the request and leaves the
/// session ready for the next turn.
pub struct PendingTurn<'a> {
    run: RelayRun,
    accumulator: MessageAccumulator<'a>,
}

impl PendingTurn<'_> {
    pub fn request_id(&self) -> uuid::Uuid {
        self.run.request_id()
    }

    /// Id of the assistant message receiving the reply.
    pub fn message_id(&self) -> MessageId {
        self.accumulator.message_id()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.run.cancel_handle()
    }

    /// Streams the reply into the conversation.
    pub async fn complete(self) -> RelayOutcome {
        self.complete_with(&mut NoopListener).await
    }

    /// Streams the reply into the conversation, mirroring every event to
    /// `observer` after the conversation has been updated.
    pub async fn complete_with<L>(mut self, observer: &mut L) -> RelayOutcome
    where
        L: RelayListener + ?Sized,
    {
        let mut tee = Tee {
            first: &mut self.accumulator,
            second: observer,
        };
        let outcome = self.run.drive(&mut tee).await;
        if outcome == RelayOutcome::Cancelled {
            self.accumulator.cancelled();
        }
        outcome
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if self.run.state() != RelayState::Settled {
            self.run.cancel();
            self.accumulator.cancelled();
        }
    }
}

struct NoopListener;

impl RelayListener for NoopListener {
    fn on_content(&mut self, _text: &str) {}
    fn on_error(&mut self, _message: &str) {}
    fn on_complete(&mut self) {}
}

struct Tee<'x, A: ?Sized, B: ?Sized> {
    first: &'x mut A,
    second: &'x mut B,
}

impl<A, B> RelayListener for Tee<'_, A, B>
where
    A: RelayListener + ?Sized,
    B: RelayListener + ?Sized,
{
    fn on_content(&mut self, text: &str) {
        self.first.on_content(text);
        self.second.on_content(text);
    }

    fn on_error(&mut self, message: &str) {
        self.first.on_error(message);
        self.second.on_error(message);
    }

    fn on_complete(&mut self) {
        self.first.on_complete();
        self.second.on_complete();
    }
}
