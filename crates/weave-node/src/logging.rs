//! Structured logging setup for nodes and the simulator.
//!
//! The level comes from `RUST_LOG` and defaults to `info`. A process can
//! install a subscriber only once; later calls return an error.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable output.
///
/// ```no_run
/// weave_node::logging::init().ok();
/// tracing::info!(node = "a", "node started");
/// ```
pub fn init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_target(true))
        .try_init()
}

/// One JSON object per event, for log aggregation.
pub fn init_json() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let first = init();
        assert!(init_json().is_err() || first.is_err());
    }
}
