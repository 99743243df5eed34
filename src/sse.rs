//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! The body of a streaming response is a sequence of lines.  Each line is
//! handled on its own: `data: {json}` lines carry a content delta,
//! `data: [DONE]` ends the stream, and everything else (blank lines, `:`
//! comments, unknown fields) is skipped.  A frame whose JSON cannot be parsed
//! is logged and dropped; it never aborts the stream.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::observability::{STREAM_BYTES, STREAM_FRAMES, STREAM_MALFORMED_FRAMES};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// An event decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty fragment of assistant output.
    Delta(String),
    /// The server sent `[DONE]`.
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental line assembler and frame parser.
///
/// Bytes may be pushed in arbitrary chunks; a line is only interpreted once
/// its terminating newline has arrived (or the stream has been closed).
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
    closed: bool,
    malformed: u64,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and return the events of every complete line.
    ///
    /// Nothing is returned once `[DONE]` has been seen, even if the chunk
    /// carries more data after it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done || self.closed {
            return events;
        }
        self.buffer.extend_from_slice(chunk);
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.process_line(&line[..line.len() - 1], &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Signal the end of the body; a final line without a newline is processed.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.done && !self.closed && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line, &mut events);
        }
        self.closed = true;
        events
    }

    /// True once `[DONE]` has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of `data:` frames dropped because their JSON was malformed.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                self.malformed += 1;
                STREAM_MALFORMED_FRAMES.click();
                log::debug!("skipping SSE line with invalid UTF-8: {e}");
                return;
            }
        };
        match parse_line(line) {
            Ok(Some(event)) => {
                STREAM_FRAMES.click();
                if event == SseEvent::Done {
                    self.done = true;
                }
                events.push(event);
            }
            Ok(None) => {}
            Err(e) => {
                self.malformed += 1;
                STREAM_MALFORMED_FRAMES.click();
                log::debug!("skipping malformed SSE frame {line:?}: {e}");
            }
        }
    }
}

/// Interpret one line of the body.
///
/// Returns `Ok(None)` for lines that carry nothing (blank, comment, unknown
/// field, or a frame without content) and `Err` for a `data:` frame whose
/// payload is not valid chunk JSON.
pub fn parse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    if payload == DONE_MARKER {
        return Ok(Some(SseEvent::Done));
    }
    let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty());
    Ok(content.map(SseEvent::Delta))
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Errors from the byte stream are surfaced as [`Error::Streaming`] and end
/// the event stream.  The event stream also ends right after [`SseEvent::Done`].
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = Box::pin(byte_stream.map(|result| {
        result.map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    }));

    stream::unfold(
        (stream, SseDecoder::new(), VecDeque::new(), false),
        |(mut stream, mut decoder, mut pending, mut ended)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (stream, decoder, pending, ended)));
                }
                if ended || decoder.is_done() {
                    return None;
                }
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        pending.extend(decoder.push(&bytes));
                    }
                    Some(Err(e)) => {
                        ended = true;
                        return Some((Err(e), (stream, decoder, pending, ended)));
                    }
                    None => {
                        pending.extend(decoder.finish());
                        ended = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const HI_THERE: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                            data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
                            data: [DONE]\n";

    fn deltas(events: &[SseEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                SseEvent::Delta(text) => Some(text.as_str()),
                SseEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn decodes_two_deltas_and_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(HI_THERE.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hi".to_string()),
                SseEvent::Delta(" there".to_string()),
                SseEvent::Done,
            ]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let body = HI_THERE.as_bytes();
        for size in 1..body.len() {
            let mut decoder = SseDecoder::new();
            let mut events = Vec::new();
            for chunk in body.chunks(size) {
                events.extend(decoder.push(chunk));
            }
            events.extend(decoder.finish());
            assert_eq!(deltas(&events), "Hi there", "chunk size {size}");
            assert_eq!(events.last(), Some(&SseEvent::Done));
        }
    }

    #[test]
    fn multibyte_characters_split_across_chunks() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo ✓\"}}]}\n".as_bytes();
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in body.chunks(3) {
            events.extend(decoder.push(chunk));
        }
        assert_eq!(deltas(&events), "héllo ✓");
        assert_eq!(decoder.malformed_frames(), 0);
    }

    #[test]
    fn done_stops_processing_buffered_data() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: [DONE]\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let mut decoder = SseDecoder::new();
        let events = decoder.push(body.as_bytes());
        assert_eq!(events, vec![SseEvent::Delta("a".to_string()), SseEvent::Done]);
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn malformed_frame_between_valid_frames() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\
                    data: {not json\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\" two\"}}]}\n";
        let mut decoder = SseDecoder::new();
        let events = decoder.push(body.as_bytes());
        assert_eq!(deltas(&events), "one two");
        assert_eq!(decoder.malformed_frames(), 1);
    }

    #[test]
    fn skips_comments_blank_lines_and_unknown_fields() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_line("event: message").unwrap(), None);
        assert_eq!(parse_line("id: 7").unwrap(), None);
        assert_eq!(parse_line("retry: 1000").unwrap(), None);
    }

    #[test]
    fn frames_without_content_yield_nothing() {
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#)
                .unwrap(),
            None
        );
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap(),
            None
        );
        assert_eq!(parse_line(r#"data: {"choices":[]}"#).unwrap(), None);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":null}}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn carriage_returns_are_tolerated() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\ndata: [DONE]\r\n");
        assert_eq!(events, vec![SseEvent::Delta("x".to_string()), SseEvent::Done]);
    }

    #[test]
    fn trailing_line_without_newline_is_processed_on_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Delta("tail".to_string())]);
        assert!(!decoder.is_done());
    }

    #[tokio::test]
    async fn process_split_stream() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"con")),
            Ok(Bytes::from_static(b"tent\":\"Hi\"}}]}\n\ndata: [DO")),
            Ok(Bytes::from_static(b"NE]\n")),
        ];
        let events: Vec<_> = process_sse(stream::iter(chunks)).collect().await;
        let events: Vec<SseEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![SseEvent::Delta("Hi".to_string()), SseEvent::Done]);
    }

    #[tokio::test]
    async fn process_stream_ends_without_done() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![Ok(
            Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"cut\"}}]}\n"),
        )];
        let events: Vec<_> = process_sse(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(SseEvent::Delta(text)) if text == "cut"));
    }

    #[tokio::test]
    async fn process_stream_surfaces_transport_errors() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n")),
        ];
        let events: Vec<_> = process_sse(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(&events[1], Err(e) if e.is_transport()));
    }
}
