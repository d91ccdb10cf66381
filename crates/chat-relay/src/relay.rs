//! Request-scoped streaming relay.
//!
//! [`StreamRelay::start`] spawns a task that owns the transport stream and the
//! line parser for one request and forwards classified frames over a bounded
//! channel. The returned [`RelayRun`] delivers them to a [`RelayListener`] on
//! the caller's own task, so callbacks never run concurrently with each other.
//!
//! A run moves `Idle -> Requesting -> Streaming -> Settled`. `Settled` is sticky:
//! once a terminal event or a cancellation has been observed, no further
//! callback fires for that run.

use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::classifier::{CompletionStats, Frame, classify_line};
use crate::errors::{ClientError, RelayError};
use crate::frame::frame_lines;
use crate::message::Message;
use crate::options::RelayOptions;
use crate::transport::{ChatRequest, ChatTransport};

/// Lifecycle of a single relay request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    /// No active request.
    Idle,
    /// Request in flight; no response yet.
    Requesting,
    /// Response head received; frames are being consumed.
    Streaming,
    /// Terminal. Entered exactly once.
    Settled,
}

impl RelayState {
    /// Transition taken when a request is issued; only valid from `Idle`.
    fn begin(self) -> Self {
        match self {
            Self::Idle => Self::Requesting,
            other => other,
        }
    }

    /// Transition taken for a non-terminal event. `Settled` absorbs it.
    fn observe(self) -> Self {
        match self {
            Self::Settled => Self::Settled,
            _ => Self::Streaming,
        }
    }
}

/// Terminal state of a run.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayOutcome {
    /// The final frame was observed.
    Completed(CompletionStats),
    /// The run failed; the error callback received `error.user_message()`.
    Failed(RelayError),
    /// The caller cancelled the run; no terminal callback fired.
    Cancelled,
}

/// Events produced by the relay task, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayEvent {
    /// The response head arrived.
    Streaming { request_id: uuid::Uuid },
    /// Content of one partial frame.
    Content {
        request_id: uuid::Uuid,
        seq: u64,
        text: String,
    },
    /// Terminal success.
    Completed {
        request_id: uuid::Uuid,
        stats: CompletionStats,
    },
    /// Terminal failure.
    Failed {
        request_id: uuid::Uuid,
        error: RelayError,
    },
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Receives the outbound events of one run.
pub trait RelayListener {
    /// Incremental content, zero or more times, strictly before the terminal
    /// callback.
    fn on_content(&mut self, text: &str);
    /// At most once; exclusive with `on_complete`.
    fn on_error(&mut self, message: &str);
    /// At most once; exclusive with `on_error`.
    fn on_complete(&mut self);
}

/// Closure-based [`RelayListener`].
pub struct RelayCallbacks<C, E, D> {
    on_content: C,
    on_error: E,
    on_complete: D,
}

impl<C, E, D> RelayCallbacks<C, E, D>
where
    C: FnMut(&str),
    E: FnMut(&str),
    D: FnMut(),
{
    pub fn new(on_content: C, on_error: E, on_complete: D) -> Self {
        Self {
            on_content,
            on_error,
            on_complete,
        }
    }
}

impl<C, E, D> RelayListener for RelayCallbacks<C, E, D>
where
    C: FnMut(&str),
    E: FnMut(&str),
    D: FnMut(),
{
    fn on_content(&mut self, text: &str) {
        (self.on_content)(text)
    }

    fn on_error(&mut self, message: &str) {
        (self.on_error)(message)
    }

    fn on_complete(&mut self) {
        (self.on_complete)()
    }
}

/// Handle used to cancel a run from anywhere.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Stops frame delivery and transport reads. Idempotent; a no-op once the
    /// run has settled.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Starts relay requests against a chat transport.
#[derive(Clone)]
pub struct StreamRelay {
    transport: Arc<dyn ChatTransport>,
    options: RelayOptions,
}

impl StreamRelay {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            options: RelayOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    /// Starts relaying a chat completion for `history`.
    ///
    /// Must be called from within a Tokio runtime. Callers serialize turns: a
    /// new run should only start after the previous one settled or was
    /// cancelled.
    pub fn start(&self, history: &[Message]) -> Result<RelayRun, ClientError> {
        if history.is_empty() {
            return Err(ClientError::Validation(
                "conversation history must contain at least one message".into(),
            ));
        }
        if self.options.event_buffer_capacity == 0 {
            return Err(ClientError::Validation(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }

        let request_id = uuid::Uuid::new_v4();
        let request = ChatRequest::new(request_id, history);
        let (tx, rx) = mpsc::channel(self.options.event_buffer_capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        debug!(request_id = %request_id, messages = history.len(), "starting relay");
        tokio::spawn(relay_task(
            self.transport.clone(),
            request,
            tx,
            cancel_rx.clone(),
        ));

        Ok(RelayRun {
            request_id,
            rx,
            cancel: CancelHandle {
                tx: Arc::new(cancel_tx),
            },
            cancel_rx,
            state: RelayState::Idle.begin(),
            outcome: None,
        })
    }
}

/// Request-scoped handle returned by [`StreamRelay::start`].
pub struct RelayRun {
    request_id: uuid::Uuid,
    rx: mpsc::Receiver<RelayEvent>,
    cancel: CancelHandle,
    cancel_rx: watch::Receiver<bool>,
    state: RelayState,
    outcome: Option<RelayOutcome>,
}

impl RelayRun {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Terminal outcome, once settled.
    pub fn outcome(&self) -> Option<&RelayOutcome> {
        self.outcome.as_ref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once settled. A terminal event is returned exactly once;
    /// after a cancellation nothing more is returned.
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        if self.state == RelayState::Settled {
            return None;
        }

        let received = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel_rx) => None,
            event = self.rx.recv() => Some(event),
        };
        if self.cancel.is_cancelled() {
            self.settle(RelayOutcome::Cancelled);
            return None;
        }

        let Some(event) = received else {
            self.settle(RelayOutcome::Cancelled);
            return None;
        };
        let Some(event) = event else {
            let error = RelayError::transport("relay task ended without a terminal event");
            self.settle(RelayOutcome::Failed(error.clone()));
            return Some(RelayEvent::Failed {
                request_id: self.request_id,
                error,
            });
        };

        match &event {
            RelayEvent::Streaming { .. } | RelayEvent::Content { .. } => {
                self.state = self.state.observe();
            }
            RelayEvent::Completed { stats, .. } => {
                self.settle(RelayOutcome::Completed(*stats));
            }
            RelayEvent::Failed { error, .. } => {
                self.settle(RelayOutcome::Failed(error.clone()));
            }
        }
        Some(event)
    }

    /// Delivers every remaining event to `listener` and returns the outcome.
    pub async fn drive<L>(&mut self, listener: &mut L) -> RelayOutcome
    where
        L: RelayListener + ?Sized,
    {
        while let Some(event) = self.next_event().await {
            match event {
                RelayEvent::Streaming { .. } => {}
                RelayEvent::Content { text, .. } => {
                    // A listener may cancel from inside a callback.
                    if self.cancel.is_cancelled() {
                        self.settle(RelayOutcome::Cancelled);
                        break;
                    }
                    listener.on_content(&text);
                }
                RelayEvent::Completed { .. } => listener.on_complete(),
                RelayEvent::Failed { error, .. } => listener.on_error(&error.user_message()),
            }
        }
        self.outcome.clone().unwrap_or(RelayOutcome::Cancelled)
    }

    /// Runs to completion and returns the concatenated content.
    pub async fn collect_text(mut self) -> Result<String, RelayError> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            if let RelayEvent::Content { text: chunk, .. } = event {
                text.push_str(&chunk);
            }
        }
        match self.outcome.take() {
            Some(RelayOutcome::Completed(_)) => Ok(text),
            Some(RelayOutcome::Failed(error)) => Err(error),
            Some(RelayOutcome::Cancelled) | None => Err(RelayError::Cancelled),
        }
    }

    fn settle(&mut self, outcome: RelayOutcome) -> bool {
        if self.state == RelayState::Settled {
            return false;
        }
        match &outcome {
            RelayOutcome::Completed(stats) => {
                info!(request_id = %self.request_id, eval_count = stats.eval_count, "relay completed");
            }
            RelayOutcome::Failed(error) => {
                warn!(request_id = %self.request_id, error = %error, "relay failed");
            }
            RelayOutcome::Cancelled => {
                info!(request_id = %self.request_id, "relay cancelled");
            }
        }
        self.state = RelayState::Settled;
        self.outcome = Some(outcome);
        true
    }
}

impl Drop for RelayRun {
    fn drop(&mut self) {
        if self.state != RelayState::Settled {
            self.cancel.cancel();
        }
    }
}

async fn relay_task(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
    tx: mpsc::Sender<RelayEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let request_id = request.request_id;

    let opened = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {
            debug!(request_id = %request_id, "relay cancelled while requesting");
            return;
        }
        opened = transport.open(request) => opened,
    };
    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(error) => {
            let _ = send_event(&tx, &mut cancel_rx, RelayEvent::Failed { request_id, error }).await;
            return;
        }
    };
    if !send_event(&tx, &mut cancel_rx, RelayEvent::Streaming { request_id }).await {
        return;
    }

    let mut lines = std::pin::pin!(frame_lines(bytes));
    let mut seq = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                debug!(request_id = %request_id, seq, "relay cancelled while streaming");
                return;
            }
            next = lines.next() => next,
        };

        let terminal = match next {
            Some(Ok(line)) => match classify_line(&line) {
                Ok(Frame::Partial(partial)) => {
                    debug!(request_id = %request_id, seq, "partial frame");
                    let event = RelayEvent::Content {
                        request_id,
                        seq,
                        text: partial.message.content,
                    };
                    seq = seq.saturating_add(1);
                    if !send_event(&tx, &mut cancel_rx, event).await {
                        return;
                    }
                    continue;
                }
                Ok(Frame::Final(last)) => RelayEvent::Completed {
                    request_id,
                    stats: last.stats,
                },
                Err(error) => RelayEvent::Failed { request_id, error },
            },
            Some(Err(error)) => RelayEvent::Failed { request_id, error },
            None => RelayEvent::Failed {
                request_id,
                error: RelayError::Truncated { discarded_bytes: 0 },
            },
        };
        // Anything after the terminal frame is never read.
        let _ = send_event(&tx, &mut cancel_rx, terminal).await;
        return;
    }
}

/// Resolves once the cancellation flag is set.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

async fn send_event(
    tx: &mpsc::Sender<RelayEvent>,
    cancel_rx: &mut watch::Receiver<bool>,
    event: RelayEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancelled(cancel_rx) => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}
