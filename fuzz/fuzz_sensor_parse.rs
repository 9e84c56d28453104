//! Fuzz target for sensor file parsing and payload encoding.
//!
//! Run with: cargo +nightly fuzz run fuzz_sensor_parse
//!
//! Whatever the sensor files hold, parsing must not panic and an encoded
//! reading must stay within the payload limit.

#![no_main]

use iotclient_core::reading::{MAX_PAYLOAD_LEN, Reading};
use iotclient_core::sensor::{parse_heater_state, parse_temperature};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (temperature, heater) = data.split_at(data.len() / 2);
    let temperature = String::from_utf8_lossy(temperature);
    let heater = String::from_utf8_lossy(heater);

    let heater_on = parse_heater_state(&heater);
    if let Some(value) = parse_temperature(&temperature) {
        assert!(value.is_finite());
        if let Ok(body) = Reading::new(value, heater_on).form_body() {
            assert!(body.len() <= MAX_PAYLOAD_LEN);
        }
    }
});
