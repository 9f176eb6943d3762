//! Fuzz target: path guard.
//!
//! No input may panic the guard, and no accepted path may contain a
//! `..` segment or start with a denied prefix.
#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(path) = std::str::from_utf8(data) {
        if warden_core::validate_path(path).is_ok() {
            assert!(!path.is_empty());
            assert!(!path.split('/').any(|segment| segment == ".."));
            for prefix in ["/etc/", "/proc/", "/sys/", "/dev/"] {
                assert!(!path.starts_with(prefix), "accepted denied prefix: {path}");
            }
        }
    }
});
