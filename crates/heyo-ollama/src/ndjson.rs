// NDJSON framing over a byte stream
//
// Network reads do not line up with JSON lines, so bytes are buffered until
// a newline arrives. Blank lines are skipped and lines that fail to parse
// are dropped with a debug log; neither aborts the stream. A line longer
// than MAX_LINE_BYTES does.

use futures::{stream, Stream, StreamExt};
use heyo_core::{AgentLoopError, BackendChunk, BackendChunkStream, Result};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::debug;

use crate::types::OllamaStreamLine;

/// Longest line accepted from the backend, newline excluded
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates bytes and hands out complete lines
#[derive(Debug)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }

    /// Append bytes, returning every line completed by them
    ///
    /// Fails once a line, complete or not, exceeds the limit.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            if pos > self.limit {
                return Err(self.overflow());
            }
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line_bytes).into_owned());
        }
        if self.buffer.len() > self.limit {
            return Err(self.overflow());
        }
        Ok(lines)
    }

    /// Whatever is left once the stream ends without a trailing newline
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    fn overflow(&mut self) -> AgentLoopError {
        debug!(buffered = self.buffer.len(), limit = self.limit, "NDJSON line too long");
        self.buffer = Vec::new();
        AgentLoopError::stream("line too long")
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

/// Parse one line into a chunk; `None` for blank or malformed lines
pub(crate) fn parse_line(line: &str) -> Option<Result<BackendChunk>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaStreamLine>(trimmed) {
        Ok(OllamaStreamLine {
            error: Some(error), ..
        }) => Some(Err(AgentLoopError::stream(error))),
        Ok(line) => Some(Ok(line.into_chunk())),
        Err(e) => {
            debug!(error = %e, line = %trimmed, "Skipping malformed NDJSON line");
            None
        }
    }
}

struct State<S> {
    bytes: Pin<Box<S>>,
    buffer: LineBuffer,
    pending: VecDeque<Result<BackendChunk>>,
    finished: bool,
}

impl<S> State<S> {
    fn enqueue(&mut self, line: &str) {
        if let Some(item) = parse_line(line) {
            self.pending.push_back(item);
        }
    }
}

/// Turn a response byte stream into a stream of parsed chunks
///
/// A transport error or an oversized line ends the stream after yielding a
/// `BackendStream` error.
pub(crate) fn chunk_stream<S, B, E>(bytes: S) -> BackendChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = State {
        bytes: Box::pin(bytes),
        buffer: LineBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(data)) => match state.buffer.push(data.as_ref()) {
                    Ok(lines) => {
                        for line in lines {
                            state.enqueue(&line);
                        }
                    }
                    Err(e) => {
                        state.pending.push_back(Err(e));
                        state.finished = true;
                    }
                },
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(AgentLoopError::stream(e.to_string())));
                    state.finished = true;
                }
                None => {
                    if let Some(rest) = state.buffer.finish() {
                        state.enqueue(&rest);
                    }
                    state.finished = true;
                }
            }
        }
    }))
}
