//! Build-time metadata embedded by the build script.
//!
//! Logged once when the daemon starts so syslog entries can be matched to
//! a specific binary.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("IOTCLIENT_GIT_HASH");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("IOTCLIENT_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, release)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}
