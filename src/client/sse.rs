//! Server-Sent Events (SSE) decoding for the long-lived event stream.
//!
//! Turns the raw bytes of a `text/event-stream` body into [`RawFrame`]s.
//! Frames are dispatched on blank lines; `data:` lines within one frame are
//! joined with `\n`. Partial lines are buffered across chunks so multi-byte
//! UTF-8 sequences may be split anywhere.

use crate::error::{McpError, McpResult};
use crate::types::RawFrame;

/// Incremental SSE decoder.
///
/// Feed it body chunks with [`feed()`](Self::feed); each call returns the
/// frames completed by that chunk. Call [`finish()`](Self::finish) once the
/// body ends to flush a final frame that had no terminating blank line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: PendingFrame,
}

#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    comment: Option<String>,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty() && self.id.is_none() && self.comment.is_none()
    }

    fn take(&mut self) -> Option<RawFrame> {
        if self.is_empty() {
            return None;
        }
        let pending = std::mem::take(self);
        Some(RawFrame {
            event: pending.event,
            data: pending.data.join("\n"),
            id: pending.id,
            comment: pending.comment,
        })
    }
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of the body.
    ///
    /// A line that is not valid UTF-8 yields a `Protocol` error item; decoding
    /// continues with the next line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<McpResult<RawFrame>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            match std::str::from_utf8(&line) {
                Ok(text) => {
                    if let Some(frame) = self.process_line(text) {
                        out.push(Ok(frame));
                    }
                }
                Err(e) => out.push(Err(McpError::Protocol(format!(
                    "invalid UTF-8 in SSE stream: {e}"
                )))),
            }
        }

        out
    }

    /// Flush whatever remains once the body has ended.
    pub fn finish(&mut self) -> Option<RawFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let text = String::from_utf8_lossy(&rest);
            let text = text.trim_end_matches('\r');
            if let Some(frame) = self.process_line(text) {
                return Some(frame);
            }
        }
        self.pending.take()
    }

    fn process_line(&mut self, line: &str) -> Option<RawFrame> {
        // Blank line = frame boundary.
        if line.is_empty() {
            return self.pending.take();
        }

        // SSE comments are keep-alives.
        if let Some(comment) = line.strip_prefix(':') {
            self.pending.comment = Some(comment.trim().to_string());
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            // Reconnection timing is governed by the client's own policy.
            "retry" => {}
            other => tracing::debug!(field = other, "ignoring unknown SSE field"),
        }
        None
    }
}

/// Adapt a streaming HTTP response body into a lazy sequence of frames.
///
/// The sequence ends when the server closes the body; a read failure is
/// yielded as a final `Transport` error.
#[cfg(feature = "http")]
pub(crate) fn frames_from_response(response: reqwest::Response) -> super::transport::FrameStream {
    use futures::StreamExt;

    let stream = async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk_result) = body.next().await {
            match chunk_result {
                Ok(chunk) => {
                    for item in decoder.feed(&chunk) {
                        yield item;
                    }
                }
                Err(e) => {
                    yield Err(McpError::Transport(format!("error reading SSE stream: {e}")));
                    return;
                }
            }
        }

        if let Some(frame) = decoder.finish() {
            yield Ok(frame);
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<RawFrame> {
        let mut decoder = SseDecoder::new();
        let mut frames: Vec<RawFrame> = decoder
            .feed(input.as_bytes())
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        frames.extend(decoder.finish());
        frames
    }

    #[test]
    fn test_event_and_data_pair() {
        let frames = decode_all("event: endpoint\ndata: /messages/?session_id=abc\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("endpoint"));
        assert_eq!(frames[0].data, "/messages/?session_id=abc");
    }

    #[test]
    fn test_multiline_data_joined() {
        let frames = decode_all("event: tools\ndata: [\ndata: {\"name\":\"a\"}]\n\n");
        assert_eq!(frames[0].data, "[\n{\"name\":\"a\"}]");
    }

    #[test]
    fn test_crlf_line_endings() {
        let frames = decode_all("event: result\r\ndata: {}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("result"));
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn test_comment_frame() {
        let frames = decode_all(": keepalive\n\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_comment());
        assert_eq!(frames[0].comment.as_deref(), Some("keepalive"));
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: to").is_empty());
        assert!(decoder.feed(b"ols\ndata: []").is_empty());
        let frames = decoder.feed(b"\n\n");
        assert_eq!(frames.len(), 1);
        let frame = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(frame.event.as_deref(), Some("tools"));
        assert_eq!(frame.data, "[]");
    }

    #[test]
    fn test_multibyte_utf8_split() {
        let bytes = "event: result\ndata: \"héllo\"\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let frames = decoder.feed(&bytes[split..]);
        assert_eq!(frames[0].as_ref().unwrap().data, "\"héllo\"");
    }

    #[test]
    fn test_unterminated_frame_flushed() {
        let frames = decode_all("event: tools\ndata: []");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "[]");
    }

    #[test]
    fn test_invalid_utf8_is_protocol_error() {
        let mut decoder = SseDecoder::new();
        let items = decoder.feed(b"data: \xff\xfe\n");
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(McpError::Protocol(_))));
    }

    #[test]
    fn test_id_and_retry_fields() {
        let frames = decode_all("id: 7\nretry: 5000\nevent: ping\n\n");
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].event.as_deref(), Some("ping"));
        assert_eq!(frames[0].data, "");
    }

    #[test]
    fn test_consecutive_blank_lines() {
        let frames = decode_all("\n\n\nevent: a\ndata: 1\n\n\n\nevent: b\ndata: 2\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].event.as_deref(), Some("b"));
    }
}
