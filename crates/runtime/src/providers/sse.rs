//! Incremental Server-Sent Events line decoder.
//!
//! Chat completion streams arrive as `data: <json>` lines in arbitrary
//! byte chunks. The decoder buffers partial lines and yields complete
//! events.

/// A decoded event from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// The payload of a `data:` line.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0usize;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(event) = parse_line(&self.buf[start..end]) {
                events.push(event);
            }
            start = end + 1;
        }
        if start > 0 {
            self.buf.drain(..start);
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<SseEvent> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim(),
        Err(e) => {
            tracing::warn!(
                line = %String::from_utf8_lossy(line),
                error = %e,
                "skipping stream line with invalid UTF-8"
            );
            return None;
        }
    };
    // blank lines separate events; `:` lines are comments
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}
