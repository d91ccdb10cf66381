//! NDJSON line framing.
//!
//! The network layer delivers the response body in arbitrary chunks: a chunk
//! may end in the middle of a line (or of a multi-byte character) or carry
//! several lines at once. [`LineDecoder`] reassembles complete `\n`-terminated
//! lines; [`frame_lines`] drives it over a transport byte stream.

use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::errors::RelayError;
use crate::transport::ByteStream;

/// Push-based line reassembler. One instance per request; not restartable.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `chunk` and returns every line it completed, in order.
    ///
    /// Blank lines are skipped. A completed line that is not UTF-8 yields a
    /// `MalformedFrame` after the lines that preceded it; scanning stops there
    /// and any later bytes stay buffered.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Result<String, RelayError>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = decode_line(&self.buf[start..end]);
            start = end + 1;
            match line {
                Ok(Some(line)) => lines.push(Ok(line)),
                Ok(None) => {}
                Err(err) => {
                    lines.push(Err(err));
                    break;
                }
            }
        }
        self.buf.drain(..start);
        lines
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Flushes the unterminated tail after a clean end of stream.
    pub fn finish(self) -> Result<Option<String>, RelayError> {
        decode_line(&self.buf)
    }

    /// Drops the unterminated tail after an abnormal close and returns how
    /// many bytes were discarded.
    pub fn discard(self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> Result<Option<String>, RelayError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = std::str::from_utf8(raw).map_err(|e| {
        RelayError::malformed(String::from_utf8_lossy(raw), format!("invalid UTF-8: {e}"))
    })?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(line.to_string()))
}

/// Lazily splits a transport byte stream into NDJSON lines.
///
/// The sequence ends when the byte stream ends. A clean end flushes any
/// unterminated tail as a last line. A transport error discards the tail;
/// when the error is `Truncated` it is annotated with the discarded length.
pub fn frame_lines(
    bytes: ByteStream,
) -> impl futures::Stream<Item = Result<String, RelayError>> + Send {
    struct State {
        bytes: ByteStream,
        decoder: Option<LineDecoder>,
        pending: VecDeque<Result<String, RelayError>>,
    }

    stream::try_unfold(
        State {
            bytes,
            decoder: Some(LineDecoder::new()),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(line) = state.pending.pop_front() {
                    return line.map(|line| Some((line, state)));
                }
                let Some(decoder) = state.decoder.as_mut() else {
                    return Ok(None);
                };

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(decoder.push_chunk(&chunk));
                    }
                    Some(Err(err)) => {
                        let discarded = state.decoder.take().map(LineDecoder::discard).unwrap_or(0);
                        if discarded > 0 {
                            debug!(discarded, "dropping unterminated line after transport failure");
                        }
                        return Err(match err {
                            RelayError::Truncated { discarded_bytes } => RelayError::Truncated {
                                discarded_bytes: discarded_bytes + discarded,
                            },
                            other => other,
                        });
                    }
                    None => {
                        if let Some(decoder) = state.decoder.take()
                            && let Some(line) = decoder.finish()?
                        {
                            state.pending.push_back(Ok(line));
                        }
                    }
                }
            }
        },
    )
}
