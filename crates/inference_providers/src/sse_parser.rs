use crate::{ChatCompletionChunk, CompletionError};
use bytes::Bytes;
use futures_util::Stream;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

/// SSE (Server-Sent Events) stream parser that properly handles buffering
/// of incomplete events across HTTP chunks
pub struct SSEParser<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<ChatCompletionChunk, CompletionError>>,
    finished: bool,
}

impl<S, E> SSEParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn parse_data(data: &str) -> Result<Option<ChatCompletionChunk>, CompletionError> {
        // Handle end-of-stream marker
        if data == "[DONE]" {
            return Ok(None);
        }

        serde_json::from_str::<ChatCompletionChunk>(data)
            .map(Some)
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to parse chat completion chunk");
                CompletionError::InvalidResponse(format!("Invalid JSON in SSE event: {e}"))
            })
    }

    /// Drain complete lines from the buffer into the pending queue.
    /// Lines are split on raw bytes so multi-byte characters split across
    /// HTTP chunks are decoded intact.
    fn process_buffer(&mut self) {
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                match Self::parse_data(data.trim_start()) {
                    Ok(Some(chunk)) => self.pending.push_back(Ok(chunk)),
                    Ok(None) => {} // [DONE] marker
                    Err(e) => self.pending.push_back(Err(e)),
                }
            }
        }
    }
}

impl<S, E> Stream for SSEParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<ChatCompletionChunk, CompletionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(result) = self.pending.pop_front() {
                return Poll::Ready(Some(result));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.process_buffer();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(CompletionError::CompletionError(
                        e.to_string(),
                    ))));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    // A final line without a trailing newline is still an event
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                        self.process_buffer();
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
