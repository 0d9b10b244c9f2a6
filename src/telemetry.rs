//! Logging setup

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,placeprep_client=debug";

/// Installs a fmt subscriber filtered by `RUST_LOG`
///
/// Returns `false` if a global subscriber was already installed, so hosts
/// and tests can call it unconditionally.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
