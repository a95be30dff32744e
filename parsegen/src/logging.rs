//! Diagnostic tracing for the agent.
//!
//! - **Tracing (this module)**: stage transitions and subprocess details via
//!   `RUST_LOG`, written to stderr.
//! - **Attempt logs (`io/attempt_log`)**: per-attempt artifacts under
//!   `.parsegen/attempts/`. Always written, unaffected by `RUST_LOG`.
//!
//! Product output (the plan and the final notice) goes to stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "parsegen=info,warn";

/// Initialize the tracing subscriber.
///
/// ```bash
/// RUST_LOG=parsegen=debug parsegen run --target icici
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
