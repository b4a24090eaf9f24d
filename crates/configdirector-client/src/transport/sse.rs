//! Incremental `text/event-stream` decoder.
//!
//! Bytes are fed as they arrive from the response body; complete events are
//! returned once their terminating blank line has been seen. Frame boundaries
//! may fall anywhere, including inside a multi-byte character.

use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if the server set one.
    pub event: Option<String>,
    /// All `data:` lines of the event joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: SseEvent,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `chunk` and returns every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let raw = &self.buffer[consumed..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw).into_owned();
            consumed = end + 1;
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..consumed);
        events
    }

    /// Reconnect delay last announced by the server.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.pending.id = Some(value.to_string());
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.pending);
        if !std::mem::take(&mut self.has_data) {
            return None;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"kind\":\"full\"}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                data: "{\"kind\":\"full\"}".into(),
                ..SseEvent::default()
            }]
        );
    }

    #[test]
    fn events_span_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: configs\nda").is_empty());
        assert!(decoder.feed(b"ta: first\r\ndata:second\r\n").is_empty());
        let events = decoder.feed(b"\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("configs"));
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn multibyte_characters_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let events = decoder.feed(&bytes[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn comments_and_empty_events_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\n\nevent: ping\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn id_and_retry_fields_are_tracked() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"retry: 2500\nid: 42\ndata: x\n\nretry: soon\n");
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(decoder.last_event_id(), Some("42"));
        assert_eq!(decoder.retry(), Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn several_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: a\n\ndata: b\n\ndata: c");
        assert_eq!(
            events.iter().map(|e| e.data.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(decoder.feed(b"\n\n")[0].data, "c");
    }
}
