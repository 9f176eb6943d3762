//! Fuzz target: SSE parser.
//!
//! Chunked arbitrary input must never panic the incremental parser, and
//! splitting the input at any point must not change the event count.
#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_gateway::sse::{parse_events, SseParser};

fuzz_target!(|data: &[u8]| {
    let body = String::from_utf8_lossy(data);
    let whole = parse_events(&body);

    let mid = body.len() / 2;
    // Split on a char boundary near the middle.
    let mut split = mid;
    while split > 0 && !body.is_char_boundary(split) {
        split -= 1;
    }
    let mut parser = SseParser::new();
    let mut chunked = parser.push(&body[..split]);
    chunked.extend(parser.push(&body[split..]));

    // The final unterminated line is only flushed by parse_events, so
    // chunked parsing may see at most one fewer event.
    assert!(whole.len() >= chunked.len());
    assert!(whole.len() - chunked.len() <= 1);
});
