//! Tracing subscriber setup.
//!
//! Human-readable fmt output filtered by `RUST_LOG`. Safe to call more than
//! once: later calls are no-ops, so every test can initialise logging.

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber with `RUST_LOG`, defaulting to `info`.
pub fn init() {
    init_with_default("info");
}

/// Installs the fmt subscriber with `RUST_LOG`, falling back to `default_directive`.
pub fn init_with_default(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
