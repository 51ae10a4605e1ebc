//! `tracing` subscriber setup.
//!
//! The daemon logs to stderr in compact form. `RUST_LOG` takes precedence
//! over the configured level so an operator can raise verbosity for one
//! module without touching the settings file.

use tracing_subscriber::EnvFilter;

/// Build the filter used by [`init_subscriber`].
///
/// Falls back to `info` when `level` is not a valid filter directive.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails only if a global subscriber is already set
    let _ = subscriber.try_init();
}
