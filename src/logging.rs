//! Tracing setup for binaries and integration harnesses.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Filter comes from `RUST_LOG`,
/// defaulting to `info`. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
