//! The sensor snapshot taken once per sample cycle.

use std::fmt::Write as _;

/// Upper bound on an encoded payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 100;

/// Content type of the encoded payload.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors from encoding a [`Reading`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("temperature {0} is not a finite number")]
    NonFinite(f64),

    #[error("payload is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },
}

/// One sample: the temperature and whether the heater is on.
///
/// Built fresh every cycle and consumed once by the reporter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    temperature: f64,
    heater_on: bool,
}

impl Reading {
    /// Any temperature is accepted here; [`form_body`](Self::form_body)
    /// refuses to encode one that is not finite.
    pub fn new(temperature: f64, heater_on: bool) -> Self {
        Self {
            temperature,
            heater_on,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    /// The heater state as sent on the wire.
    pub fn heater_label(&self) -> &'static str {
        if self.heater_on { "ON" } else { "OFF" }
    }

    /// Encode as `temperature=<2 decimals>&heater_state=<ON|OFF>`.
    pub fn form_body(&self) -> Result<String, PayloadError> {
        if !self.temperature.is_finite() {
            return Err(PayloadError::NonFinite(self.temperature));
        }

        let mut body = String::with_capacity(MAX_PAYLOAD_LEN);
        // Writing into a String cannot fail.
        let _ = write!(
            body,
            "temperature={:.2}&heater_state={}",
            self.temperature,
            self.heater_label()
        );

        if body.len() > MAX_PAYLOAD_LEN {
            return Err(PayloadError::TooLarge {
                len: body.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(body)
    }
}
