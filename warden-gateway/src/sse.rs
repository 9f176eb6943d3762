//! Server-sent event framing and parsing.
//!
//! Frames are `data: <JSON>\n\n`. The parser is the consumer-side
//! counterpart used by clients and tests: it tolerates chunk boundaries
//! anywhere, skips blank lines and `[DONE]` markers, and drops invalid
//! JSON silently.

use serde::Serialize;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Encodes one event as a `data:` frame.
///
/// Serialization of the event types used on these streams cannot fail;
/// a failure is reported as an error-shaped frame rather than a panic.
#[must_use]
pub fn encode_frame<T: Serialize>(event: &T) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(e) => format!("data: {{\"type\":\"error\",\"message\":\"encode: {e}\"}}\n\n"),
    }
}

/// Encodes one event for an axum SSE response. Axum adds the `data: `
/// prefix and blank-line terminator; the payload is the JSON object.
#[must_use]
pub fn to_sse_event<T: Serialize>(event: &T) -> axum::response::sse::Event {
    let payload = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => format!("{{\"type\":\"error\",\"message\":\"encode: {e}\"}}"),
    };
    axum::response::sse::Event::default().data(payload)
}

/// Incremental SSE parser.
///
/// Feed it chunks as they arrive; complete events come back as parsed
/// JSON values. Partial lines are buffered across chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<serde_json::Value> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(value) = parse_line(line.trim_end_matches(['\r', '\n'])) {
                events.push(value);
            }
        }
        events
    }
}

/// Parses one SSE line; `None` for blanks, comments, `[DONE]`, non-data
/// lines, and invalid JSON.
fn parse_line(line: &str) -> Option<serde_json::Value> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    serde_json::from_str(data).ok()
}

/// Parses a complete SSE body in one go.
#[must_use]
pub fn parse_events(body: &str) -> Vec<serde_json::Value> {
    let mut parser = SseParser::new();
    let mut events = parser.push(body);
    // A final event without a trailing newline still counts.
    if !parser.buffer.is_empty() {
        if let Some(value) = parse_line(parser.buffer.trim_end_matches(['\r', '\n'])) {
            events.push(value);
        }
    }
    events
}

/// Drains an SSE byte stream into events until it ends or `cancel` fires.
pub async fn collect_events<S, B, E>(stream: S, cancel: CancellationToken) -> Vec<serde_json::Value>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut parser = SseParser::new();
    let mut events = Vec::new();
    let mut stream = stream;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(chunk)) => {
                    events.extend(parser.push(&String::from_utf8_lossy(chunk.as_ref())));
                }
                Some(Err(_)) | None => break,
            },
        }
    }
    events
}
