//! Server-sent events parsing
//!
//! Turns a chunked HTTP body into the sequence of `data:` payloads it
//! carries. Events are separated by a blank line; chunk boundaries may fall
//! anywhere, including inside a multi-byte character, so raw bytes are
//! buffered until a full event block is available.

use crate::error::{ConfabError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

struct SseState<S> {
    inner: S,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S> SseState<S> {
    fn drain_complete_events(&mut self) {
        while let Some((pos, delimiter_len)) = find_event_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + delimiter_len).collect();
            let text = String::from_utf8_lossy(&block[..pos]);
            if let Some(data) = parse_event_block(&text) {
                self.ready.push_back(data);
            }
        }
    }
}

/// Parse an SSE byte stream into its `data:` payloads.
///
/// The returned stream ends when the body ends. A transport error yields a
/// single `ConfabError::StreamInterrupted` item and then ends the stream.
///
/// # Arguments
///
/// * `byte_stream` - The raw HTTP response body as a stream of byte chunks.
pub fn data_events<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin,
    E: Display + Send,
{
    let state = SseState {
        inner: byte_stream,
        buffer: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.ready.pop_front() {
                return Some((Ok(data), state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_complete_events();
                }
                Some(Err(e)) => {
                    state.finished = true;
                    tracing::warn!("SSE transport error: {}", e);
                    let error = ConfabError::StreamInterrupted(e.to_string());
                    return Some((Err(error.into()), state));
                }
                None => {
                    state.finished = true;
                    // Process any remaining partial event in the buffer.
                    let rest = std::mem::take(&mut state.buffer);
                    if let Some(data) = parse_event_block(&String::from_utf8_lossy(&rest)) {
                        state.ready.push_back(data);
                    }
                }
            }
        }
    })
}

/// Locate the first blank-line event delimiter, returning its offset and length.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Extract the joined `data:` value of one event block.
///
/// Comment lines, `event:`, `id:` and `retry:` fields are ignored; blocks
/// without data yield nothing.
fn parse_event_block(block: &str) -> Option<String> {
    let data_lines: Vec<&str> = block
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data_lines.is_empty() {
        return None;
    }

    let data = data_lines.join("\n");
    if data.trim().is_empty() {
        None
    } else {
        Some(data)
    }
}
