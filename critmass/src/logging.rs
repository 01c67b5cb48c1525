//! Diagnostic logging for library users and tests.
//!
//! Diagnostics go to stderr through `tracing-subscriber`, filtered by
//! `RUST_LOG` (default `warn`). Simulation data events (targets
//! `extraction`, `contagion`, `reform`) are a separate channel: capture them
//! with `instrument::DataFrameSubscriber` instead.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Panics if one is already set; use
/// [`try_init`] where that can happen.
///
/// ```bash
/// RUST_LOG=critmass=debug cargo test
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Like [`init`], but reports an already-installed subscriber as an error.
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
}
