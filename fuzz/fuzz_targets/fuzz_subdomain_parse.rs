//! Fuzz target: subdomain route parser.
//!
//! Arbitrary host strings must never panic the parser, and any route it
//! accepts must satisfy the port and identity rules.
#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(host) = std::str::from_utf8(data) {
        if let Ok(route) = warden_proxy::parse_subdomain_host(host) {
            assert!(route.port >= 1024, "accepted port below range: {}", route.port);
            assert!(warden_core::validate_sandbox_id(&route.sandbox_id).is_ok());
            assert!(!route.token.is_empty());
        }
    }
});
