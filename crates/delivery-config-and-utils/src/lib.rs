//! Configuration, file system paths, and logging setup shared by the
//! delivery crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_ENDPOINT_URL, DEFAULT_LOG_LEVEL, DEFAULT_QUEUE_DIRECTORY,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
