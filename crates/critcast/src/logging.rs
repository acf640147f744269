//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`
/// (default [`DEFAULT_LOG_FILTER`]).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging() {
    init_logging_with(DEFAULT_LOG_FILTER);
}

/// Like [`init_logging`], with a custom fallback filter such as
/// `"warn,critcast=debug"`.
pub fn init_logging_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
