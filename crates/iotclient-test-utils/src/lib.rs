#![deny(unsafe_code)]

//! Shared test utilities for the iotclient workspace.
//!
//! Provides config builders, sensor-file fixtures, and a capturing HTTP
//! collector so that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! iotclient-test-utils = { workspace = true }
//! ```

pub mod collector;
pub mod config;
pub mod sensors;
