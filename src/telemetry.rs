//! Tracing subscriber setup for the CLI.
//!
//! Library code only emits `tracing` events; embedding applications wire
//! their own subscriber instead of calling this.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Installs a compact stderr subscriber. `RUST_LOG` wins over
/// `config_filter`, which wins over [`DEFAULT_FILTER`].
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(config_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
