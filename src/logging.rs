//! Logging setup for the provider binary.
//!
//! All output goes to **stderr**: stdout carries the handshake line the host
//! reads to find the gRPC address.
//!
//! `RUST_LOG` controls filtering as usual:
//!
//! ```bash
//! # Log every REST round trip to the cluster
//! RUST_LOG=hemmer_provider_dcos::client=debug hemmer apply
//! ```

use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn try_init_with(default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
}

/// Install the stderr subscriber, defaulting to `info` when `RUST_LOG` is
/// unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`] with a different fallback level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    if let Err(e) = try_init_with(default_level) {
        panic!("unable to install the logging subscriber: {}", e);
    }
}

/// Install the subscriber unless one is already set.
///
/// Returns `true` if this call installed it. Safe to call from every test.
pub fn try_init_logging() -> bool {
    try_init_with("info").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_logging_is_idempotent() {
        // Another test may have installed it first.
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
