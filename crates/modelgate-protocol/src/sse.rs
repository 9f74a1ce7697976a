use bytes::{Bytes, BytesMut};

/// One logical server-sent event: optional `event:` name plus joined `data:`
/// lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn data_only(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Re-frame this event as wire bytes.
    pub fn to_frame(&self) -> Bytes {
        let mut out = BytesMut::new();
        if let Some(event) = &self.event {
            out.extend_from_slice(b"event: ");
            out.extend_from_slice(event.as_bytes());
            out.extend_from_slice(b"\n");
        }
        for line in self.data.split('\n') {
            out.extend_from_slice(b"data: ");
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\n");
        }
        out.extend_from_slice(b"\n");
        out.freeze()
    }
}

/// Incremental SSE parser.
///
/// Feed it raw upstream chunks in arrival order. Bytes accumulate until a
/// blank-line event terminator arrives; only then is the whole block parsed
/// for its fields, so chunk boundaries never split an event and no field
/// state leaks across events.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some((block_end, resume)) = find_block_boundary(&self.buffer) {
            let block: String = self.buffer[..block_end].to_string();
            self.buffer.drain(..resume);
            events.extend(parse_block(&block));
        }
        events
    }

    /// Drain whatever is buffered at end-of-stream into a final event.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block).into_iter().collect()
    }
}

/// Locate the next blank-line terminator: a newline immediately followed by
/// another newline, with an optional carriage return in between. Returns
/// the block's end offset and where the remainder starts.
fn find_block_boundary(buffer: &str) -> Option<(usize, usize)> {
    let bytes = buffer.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\n') => return Some((i, i + 2)),
            Some(b'\r') if bytes.get(i + 2) == Some(&b'\n') => return Some((i, i + 3)),
            _ => {}
        }
    }
    None
}

/// Parse one complete event block. A block with no `event:`/`data:` fields
/// (comments only, stray blank lines) yields nothing.
fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event: Option<String> = None;
    let mut data: Option<String> = None;
    let mut saw_field = false;

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                saw_field = true;
                event = (!value.is_empty()).then(|| value.to_string());
            }
            "data" => {
                saw_field = true;
                match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                }
            }
            _ => {}
        }
    }

    saw_field.then(|| SseEvent {
        event,
        data: data.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_events_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        let first = parser.push_str("event: message_start\ndata: {\"a\":");
        assert!(first.is_empty());
        let second = parser.push_str("1}\n\n");
        assert_eq!(
            second,
            vec![SseEvent::named("message_start", "{\"a\":1}")]
        );
    }

    #[test]
    fn joins_multiple_data_lines() {
        let mut parser = SseParser::new();
        let events = parser.push_str("data: one\ndata: two\n\n");
        assert_eq!(events, vec![SseEvent::data_only("one\ntwo")]);
    }

    #[test]
    fn ignores_comment_lines_and_handles_crlf() {
        let mut parser = SseParser::new();
        let events = parser.push_str(": keepalive\r\ndata: x\r\n\r\n");
        assert_eq!(events, vec![SseEvent::data_only("x")]);
    }

    #[test]
    fn comment_only_blocks_and_stray_blank_lines_yield_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.push_str(": ping\n\n\n\n").is_empty());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn event_only_block_has_empty_data() {
        let mut parser = SseParser::new();
        let events = parser.push_str("event: message_stop\n\n");
        assert_eq!(events, vec![SseEvent::named("message_stop", "")]);
    }

    #[test]
    fn two_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.push_str("data: a\n\ndata: b\n\n");
        assert_eq!(
            events,
            vec![SseEvent::data_only("a"), SseEvent::data_only("b")]
        );
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.push_str("data: tail").is_empty());
        assert_eq!(parser.finish(), vec![SseEvent::data_only("tail")]);
    }

    #[test]
    fn bare_field_names_parse_as_empty_values() {
        let mut parser = SseParser::new();
        let events = parser.push_str("data\ndata: x\n\n");
        assert_eq!(events, vec![SseEvent::data_only("\nx")]);
    }

    #[test]
    fn frame_round_trip() {
        let event = SseEvent::named("response.completed", "{\"ok\":true}");
        let bytes = event.to_frame();
        let mut parser = SseParser::new();
        let parsed = parser.push_bytes(&bytes);
        assert_eq!(parsed, vec![event]);
    }
}
