//! Server-Sent Events (SSE) parser with line buffering.
//!
//! Network chunks split lines, and sometimes multi-byte characters, at
//! arbitrary points. Bytes are buffered until a full line is available and
//! only complete lines are decoded as UTF-8.

use std::fmt;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// The event type (from "event:" line)
    pub event: Option<String>,
    /// The event data, `data:` lines joined with `\n`
    pub data: String,
}

impl SseEvent {
    /// Check if this is a [DONE] marker.
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Incremental SSE parser.
#[derive(Default)]
pub struct SseParser {
    /// Bytes of the current incomplete line
    buffer: Vec<u8>,
    current_event: Option<String>,
    current_data: Vec<String>,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and return any complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            self.process_line(line.trim_end_matches('\r'), &mut events);
            start = end + 1;
        }
        self.buffer.drain(..start);

        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        if let Some(event) = self.finalize_event() {
            events.push(event);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        // Empty line signals end of event
        if line.is_empty() {
            if let Some(event) = self.finalize_event() {
                events.push(event);
            }
            return;
        }

        match Self::parse_field(line) {
            Some(("event", value)) => self.current_event = Some(value.to_string()),
            Some(("data", value)) => self.current_data.push(value.to_string()),
            // id, retry and unknown fields carry nothing the backends need
            _ => {}
        }
    }

    /// Split a field line into name and value. Comments yield `None`.
    fn parse_field(line: &str) -> Option<(&str, &str)> {
        if line.starts_with(':') {
            return None;
        }

        match line.split_once(':') {
            Some((field, value)) => Some((field, value.strip_prefix(' ').unwrap_or(value))),
            None => Some((line, "")),
        }
    }

    fn finalize_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_event = None;
            return None;
        }

        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
        };
        self.current_data.clear();
        Some(event)
    }

    /// Check if there's any buffered data.
    pub fn has_buffered_data(&self) -> bool {
        !self.buffer.is_empty() || !self.current_data.is_empty()
    }
}

impl fmt::Debug for SseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseParser")
            .field("buffer_len", &self.buffer.len())
            .field("current_data_lines", &self.current_data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(
            b"event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"Hi\"}\n\n",
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("response.output_text.delta"));
        assert!(events[0].data.contains("\"delta\":\"Hi\""));
    }

    #[test]
    fn test_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: line one\ndata: line two\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"delta\":").is_empty());
        assert!(parser.has_buffered_data());
        let events = parser.feed(b"\"x\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, r#"{"delta":"x"}"#);
        assert!(!parser.has_buffered_data());
    }

    #[test]
    fn test_multibyte_character_split() {
        let text = "data: caf\u{e9}\n\n".as_bytes().to_vec();
        // Split inside the two-byte encoding of 'é'.
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut parser = SseParser::new();
        assert!(parser.feed(&text[..split]).is_empty());
        let events = parser.feed(&text[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_several_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: first\n\ndata: second\n\ndata: [DONE]\n\n");

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, "first");
        assert_eq!(events[1].data, "second");
        assert!(events[2].is_done());
    }

    #[test]
    fn test_comments_and_ids_ignored() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keep-alive\nid: 7\nretry: 100\ndata: hello\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: hello\r\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_blank_lines_alone_produce_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"\n\n\r\n").is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: tail").is_empty());
        let events = parser.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "tail");
        assert!(parser.finish().is_empty());
    }
}
