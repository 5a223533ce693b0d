//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `SMARTSORT_LOG=smartsort=debug`.
pub const LOG_ENV: &str = "SMARTSORT_LOG";

/// Installs the global subscriber, writing to stderr. Defaults to `warn`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
