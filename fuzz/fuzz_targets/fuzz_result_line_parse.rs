//! Fuzz target: executor result line parser.
//!
//! The parser must reject arbitrary garbage without panicking and must
//! round-trip anything it accepts.
#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(result) = warden_executor::protocol::parse_result_line(line) {
            let encoded = match serde_json::to_string(&result) {
                Ok(s) => s,
                Err(_) => return,
            };
            assert!(warden_executor::protocol::parse_result_line(&encoded).is_ok());
        }
    }
});
