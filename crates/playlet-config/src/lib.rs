//! Configuration, filesystem paths, and logging bootstrap for the Playlet
//! client core.
//!
//! Every other crate in the workspace takes a [`Config`] (or values derived
//! from it) at construction time; nothing reads configuration globally.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{ConfigError, ConfigResult};
pub use logging::init_logging;
pub use paths::Paths;
