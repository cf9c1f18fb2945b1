//! Structured logging setup.
//!
//! Delivery outcomes are only ever visible through tracing, so a host that
//! installs no subscriber will not see failed pushes.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: this crate's events at `info`.
pub const DEFAULT_FILTER: &str = "prometheus_deferred_push=info";

/// Install the default subscriber unless one is already set.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `default_filter`
/// when `RUST_LOG` is unset or unparsable.
///
/// Thread names are included so worker-thread events (`dp-worker` by default)
/// can be told apart from the caller's. Returns `false` if a subscriber was
/// already installed.
pub fn init_tracing_with(default_filter: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true)
        .try_init()
        .is_ok()
}
