//! Structured logging using **tracing**.
//!
//! Diagnostics go to stderr as JSON lines so stdout only ever carries the
//! report (plain text, JSON or DOT). Pipeline code logs with the `tracing`
//! macros directly.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: findings and scan problems only.
const DEFAULT_FILTER: &str = "macvis_core=warn,macvis=warn";

/// Initializes the global tracing subscriber.
///
/// Call once at the beginning of the application's runtime. Later calls are
/// ignored instead of panicking.
///
/// # Environment Variables
/// - `RUST_LOG`: Controls log filtering (e.g., `RUST_LOG=macvis_core=debug`)
pub fn init_structured_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
