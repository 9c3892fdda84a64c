//! Newline-delimited JSON stream reading
//!
//! Chunks arrive in arbitrary sizes; a record is only decoded once its
//! terminating `\n` has been seen. Bytes after the last newline are held back
//! and prefixed onto the next chunk. Whatever is still held back when the
//! transport ends is discarded.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest line prefix included in diagnostics
const PREVIEW_CHARS: usize = 80;

/// One decoded unit of a chat response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Sentence text as produced by the model
    pub sentence: String,

    /// Locator of the synthesized clip for this sentence
    #[serde(rename = "audioUrl")]
    pub audio_url: String,
}

/// Accumulates bytes and splits off complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every line it completes
    ///
    /// Returned lines exclude the `\n` terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            lines.push(self.buffer[start..start + offset].to_vec());
            start += offset + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Bytes received after the last line break
    #[must_use]
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any held-back partial line, returning how many bytes were discarded
    pub fn clear(&mut self) -> usize {
        let len = self.buffer.len();
        self.buffer.clear();
        len
    }
}

/// Decode one complete line
///
/// Blank lines yield `None` silently; malformed lines are logged and yield `None`.
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_slice(trimmed) {
        Ok(record) => Some(record),
        Err(e) => {
            let preview: String = String::from_utf8_lossy(trimmed)
                .chars()
                .take(PREVIEW_CHARS)
                .collect();
            tracing::warn!(error = %e, line = %preview, "skipping malformed stream line");
            None
        }
    }
}

struct ReaderState<S, T> {
    bytes: Pin<Box<S>>,
    lines: LineBuffer,
    ready: VecDeque<T>,
    done: bool,
}

/// Decode a byte stream of newline-delimited JSON into values of `T`
///
/// Values are yielded in arrival order. A transport error is yielded once and
/// ends the stream; nothing decoded after it is emitted.
pub fn ndjson_stream<S, B, E, T>(bytes: S) -> impl Stream<Item = Result<T>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
    T: DeserializeOwned,
{
    let state = ReaderState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::new(),
        ready: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(value) = state.ready.pop_front() {
                return Some((Ok(value), state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.lines.push(chunk.as_ref());
                    state
                        .ready
                        .extend(lines.iter().filter_map(|line| decode_line(line)));
                }
                Some(Err(e)) => {
                    state.done = true;
                    let discarded = state.lines.clear();
                    tracing::debug!(discarded, "stream read failed");
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.done = true;
                    let discarded = state.lines.clear();
                    if discarded > 0 {
                        tracing::debug!(discarded, "dropping unterminated trailing line");
                    }
                }
            }
        }
    })
}

/// Decode a chat response body into [`StreamRecord`]s
pub fn record_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<StreamRecord>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    ndjson_stream(bytes)
}
