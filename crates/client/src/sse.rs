use bytes::Bytes;
use domain::StreamEvent;
use futures::Stream;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::ClientError;

/// One dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split anywhere, including inside a multi-byte character.
/// A frame is dispatched on the blank line that ends it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every frame they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        frames
    }

    /// Flush a final frame that was not followed by a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let mut frames = self.push(b"\n");
            if let Some(frame) = frames.pop() {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Decode a frame into a chat event. Frames that do not parse (an unknown
/// tool name, say) are skipped with a warning.
pub fn decode_event(frame: &SseFrame) -> Option<StreamEvent> {
    match serde_json::from_str::<StreamEvent>(&frame.data) {
        Ok(event) => {
            if let Some(name) = &frame.event {
                if name != event.event_type() {
                    tracing::warn!(
                        frame_event = %name,
                        event_type = event.event_type(),
                        "SSE event name does not match payload type"
                    );
                }
            }
            Some(event)
        }
        Err(e) => {
            tracing::warn!(error = %e, event = ?frame.event, "Skipping undecodable event");
            None
        }
    }
}

/// Chat events decoded from a byte stream
pub struct EventStream<S> {
    inner: S,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S, E> EventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<StreamEvent, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let frames = self.decoder.push(&bytes);
                    let events = frames.iter().filter_map(decode_event);
                    self.pending.extend(events);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(ClientError::Interrupted(e.to_string()))));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    if let Some(event) = self.decoder.finish().as_ref().and_then(decode_event) {
                        self.pending.push_back(event);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::FinishReason;
    use futures::{stream, StreamExt};

    fn done_frame() -> String {
        let event = StreamEvent::Done {
            message_id: "msg_1".to_string(),
            finish_reason: FinishReason::Stop,
        };
        format!(
            "event: done\ndata: {}\n\n",
            serde_json::to_string(&event).unwrap()
        )
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: text-del").is_empty());
        assert!(decoder.push(b"ta\ndata: {\"a\":").is_empty());
        let frames = decoder.push(b"1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("text-delta".to_string()),
                data: "{\"a\":1}".to_string()
            }]
        );
    }

    #[test]
    fn test_comments_and_keep_alives_are_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b":\n\n: keep-alive\n\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
        assert_eq!(frames[0].event, None);
    }

    #[test]
    fn test_multiline_data_and_crlf() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: one\r\ndata: two\r\n\r\n");
        assert_eq!(frames[0].data, "one\ntwo");
    }

    #[test]
    fn test_multibyte_character_split() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        assert!(decoder.push(&bytes[..split]).is_empty());
        let frames = decoder.push(&bytes[split..]);
        assert_eq!(frames[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_unterminated_final_frame_is_flushed() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: done\ndata: tail").is_empty());
        let frame = decoder.finish().unwrap();
        assert_eq!(frame.data, "tail");
        assert_eq!(frame.event.as_deref(), Some("done"));
    }

    #[test]
    fn test_unknown_tool_name_is_skipped() {
        let frame = SseFrame {
            event: Some("tool-call-start".to_string()),
            data: r#"{"type":"tool-call-start","messageId":"m","toolCallId":"c","toolName":"fetchUrl","input":{}}"#.to_string(),
        };
        assert_eq!(decode_event(&frame), None);
    }

    #[tokio::test]
    async fn test_event_stream_decodes_chunks() {
        let body = done_frame();
        let (a, b) = body.split_at(10);
        let chunks = vec![
            Ok::<Bytes, std::io::Error>(Bytes::from(a.to_string())),
            Ok(Bytes::from(b.to_string())),
        ];
        let events: Vec<_> = EventStream::new(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_transport_error_is_interruption() {
        let chunks = vec![
            Ok(Bytes::from(done_frame())),
            Err(std::io::Error::other("reset by peer")),
        ];
        let events: Vec<_> = EventStream::new(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(ClientError::Interrupted(_))));
    }
}
