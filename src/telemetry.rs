//! Tracing initialization helpers.
//!
//! The engine logs through [`tracing`] throughout; hosts that do not
//! install their own subscriber can call [`init_tracing`] once at startup.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a formatted stderr subscriber filtered by `RUST_LOG`
/// (defaulting to `info`). Safe to call more than once; only the first
/// call installs a subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
