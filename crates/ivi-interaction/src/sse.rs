//! Server-sent event decoding for the agent's chat stream.
//!
//! Records are newline-delimited `data: <json>` lines. Chunk boundaries are
//! arbitrary, so the decoder carries the trailing partial line between
//! pushes. Lines without the `data: ` prefix (comments, `event:` fields,
//! blank separators) and the `[DONE]` sentinel are skipped.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use ivi_core::chat::StreamEvent;
use ivi_core::Result;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental `data: ` line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = Self::decode_line(&line[..newline]) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes still waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(line: &[u8]) -> Option<StreamEvent> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(err) => {
                tracing::debug!(error = %err, "skipping non-UTF-8 event line");
                return None;
            }
        };
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(error = %err, %payload, "skipping malformed event record");
                None
            }
        }
    }
}

/// Turns a byte stream into typed events.
///
/// Byte-level errors are passed through and end the stream. A partial line
/// left when the body ends is discarded.
pub fn decode_event_stream<S>(body: S) -> BoxStream<'static, Result<StreamEvent>>
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.push(&bytes) {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
        if decoder.pending() > 0 {
            tracing::trace!(bytes = decoder.pending(), "discarding unterminated event line");
        }
    };
    stream.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivi_core::IviError;

    #[test]
    fn test_done_sentinel_alone_yields_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]\n\n").is_empty());
    }

    #[test]
    fn test_record_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"typ").is_empty());
        let events = decoder.push(b"e\":\"done\"}\n");
        assert_eq!(events, vec![StreamEvent::Done]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let record = "data: {\"type\":\"text_chunk\",\"content\":\"25 °C\"}\n".as_bytes();
        let split = record.iter().position(|&b| b == 0xC2).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&record[..split]).is_empty());
        let events = decoder.push(&record[split..]);
        assert_eq!(
            events,
            vec![StreamEvent::TextChunk {
                content: "25 °C".to_string()
            }]
        );
    }

    #[test]
    fn test_ignores_comments_blank_lines_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b": keep-alive\n\nevent: message\ndata: {\"type\":\"text_chunk\",\"content\":\"Hi\"}\r\n\n",
        );
        assert_eq!(
            events,
            vec![StreamEvent::TextChunk {
                content: "Hi".to_string()
            }]
        );
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {not json}\ndata: {\"type\":\"mystery\"}\ndata: {\"type\":\"done\"}\n",
        );
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_decode_event_stream_passes_errors_through() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"text_chunk\",\"content\":\"a\"}\n")),
            Err(IviError::stream(None, "connection reset")),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n")),
        ];
        let events: Vec<Result<StreamEvent>> =
            decode_event_stream(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].as_ref().unwrap_err().is_stream());
    }

    #[tokio::test]
    async fn test_decode_event_stream_drops_trailing_partial_line() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"text_chunk\",\"content\":\"a\"}\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"do")),
        ];
        let events: Vec<Result<StreamEvent>> =
            decode_event_stream(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
    }
}
