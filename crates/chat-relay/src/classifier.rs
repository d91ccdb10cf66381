//! Classification of decoded NDJSON lines into chat stream frames.
//!
//! The server emits zero or more partial frames followed by one final frame:
//! ```text
//! {"model":"llama3.2","created_at":"…","message":{"role":"assistant","content":"Hel"},"done":false}
//! {"model":"llama3.2","created_at":"…","message":{"role":"assistant","content":"lo"},"done":false}
//! {"model":"llama3.2","created_at":"…","done":true,"total_duration":1,"load_duration":1,"prompt_eval_count":2,"prompt_eval_duration":1,"eval_count":2,"eval_duration":1}
//! ```
//!
//! Unknown fields are ignored on both shapes.

use std::time::Duration;

use serde::Deserialize;

use crate::errors::RelayError;

/// One decoded line of the wire stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Incremental content; `done` is absent or false.
    Partial(PartialFrame),
    /// Terminating frame carrying completion statistics; `done` is true.
    Final(FinalFrame),
}

impl Frame {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PartialFrame {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    pub message: FrameMessage,
}

impl PartialFrame {
    pub fn content(&self) -> &str {
        &self.message.content
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub role: Option<String>,
    /// May be empty.
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FinalFrame {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(flatten)]
    pub stats: CompletionStats,
}

/// Timing and usage counters reported by the final frame. Durations are in
/// nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct CompletionStats {
    pub total_duration: u64,
    pub load_duration: u64,
    /// Omitted by the server when the prompt was served from cache.
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub prompt_eval_duration: u64,
    pub eval_count: u64,
    pub eval_duration: u64,
}

impl CompletionStats {
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_duration)
    }

    /// Generation throughput, if the server reported a non-zero eval duration.
    pub fn tokens_per_second(&self) -> Option<f64> {
        if self.eval_duration == 0 {
            return None;
        }
        Some(self.eval_count as f64 / Duration::from_nanos(self.eval_duration).as_secs_f64())
    }
}

/// Classifies one line as a partial or final frame.
///
/// Pure; fails with `MalformedFrame` carrying the raw line.
pub fn classify_line(line: &str) -> Result<Frame, RelayError> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| RelayError::malformed(line, format!("invalid JSON: {e}")))?;
    let Some(object) = value.as_object() else {
        return Err(RelayError::malformed(line, "expected a JSON object"));
    };
    if let Some(error) = object.get("error").and_then(|v| v.as_str()) {
        return Err(RelayError::malformed(
            line,
            format!("server reported error: {error}"),
        ));
    }

    if object.get("done").and_then(|v| v.as_bool()) == Some(true) {
        serde_json::from_value::<FinalFrame>(value)
            .map(Frame::Final)
            .map_err(|e| RelayError::malformed(line, format!("invalid final frame: {e}")))
    } else {
        serde_json::from_value::<PartialFrame>(value)
            .map(Frame::Partial)
            .map_err(|e| RelayError::malformed(line, format!("invalid partial frame: {e}")))
    }
}
