//! Tracing initialization.
//!
//! Logs go to stderr so they never mix with command output. Verbosity is
//! controlled by `PLY_LOG` (standard env-filter syntax, e.g.
//! `PLY_LOG=ply=debug`); unset means warnings only.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling log verbosity.
pub const LOG_ENV: &str = "PLY_LOG";

/// Initialize the stderr tracing subscriber. Call once, from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
