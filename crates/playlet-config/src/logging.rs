//! Logging bootstrap.
//!
//! The client core is a log producer only: call [`init_logging`] once at
//! startup and use standard `tracing` macros everywhere else. Where logs go
//! is the embedder's concern.

use crate::Config;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// The `RUST_LOG` environment variable takes precedence over the config
/// value. Subsequent calls are no-ops (the first subscriber wins), so the
/// embedder and tests may both call this safely.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}
