//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()`, which also runs
//! validation, and then through endpoint URL parsing when the config is
//! accepted.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = iotclient_config::AppConfig::parse(s) {
            // Accepted configs always carry a usable endpoint.
            assert!(config.endpoint_url().is_ok());
        }
    }
});
