//! Tracing setup.
//!
//! Console subscriber with `RUST_LOG`-style filtering. The pipeline logs
//! structured fields on every state transition; there is no exporter
//! here, just stdout.

use tracing_subscriber::EnvFilter;

/// Initialize console tracing.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}
