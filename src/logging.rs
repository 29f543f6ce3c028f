//! Logging setup
//!
//! Every stage message starts with [`LOG_TAG`] so a build's console output
//! can be grepped for the runner's lines.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Prefix for every runner log line
pub const LOG_TAG: &str = "[pipeline-runner]";

/// Initialize tracing with an environment filter.
///
/// Priority: RUST_LOG env var > `log_level` > "info". Calling this twice is
/// harmless; the second subscriber is dropped.
pub fn init(log_level: Option<&str>) {
    let fallback = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
