//! Delivery configuration.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use url::Url;

/// Default collection endpoint (can be overridden at compile time via DELIVERY_ENDPOINT_URL).
pub const DEFAULT_ENDPOINT_URL: &str = match option_env!("DELIVERY_ENDPOINT_URL") {
    Some(url) => url,
    None => "https://collector.example.invalid",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default name of the queue storage directory under the base directory.
pub const DEFAULT_QUEUE_DIRECTORY: &str = "queue";

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main delivery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the remote collection endpoint.
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// Directory (relative to the base directory) holding the queue file.
    #[serde(default = "default_queue_directory")]
    pub queue_directory: String,
    /// Per-request timeout for the HTTP client.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Interval of the optional periodic upload nudge. `None` disables it.
    #[serde(default)]
    pub retry_interval_secs: Option<u64>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_queue_directory() -> String {
    DEFAULT_QUEUE_DIRECTORY.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            endpoint_url: default_endpoint_url(),
            queue_directory: default_queue_directory(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry_interval_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the config file under `paths`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let from_file = config_path.exists();
        let mut config = if from_file {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        debug!(
            path = %config_path.display(),
            from_file,
            endpoint_url = %config.endpoint_url,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file under `paths`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Check values that would otherwise fail much later.
    pub fn validate(&self) -> CoreResult<()> {
        self.endpoint_url()?;
        if self.queue_directory.trim().is_empty() {
            return Err(CoreError::Config("queue_directory must not be empty".to_string()));
        }
        if Path::new(&self.queue_directory).is_absolute() {
            return Err(CoreError::Config(
                "queue_directory must be relative to the base directory".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.retry_interval_secs == Some(0) {
            return Err(CoreError::Config(
                "retry_interval_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("DELIVERY_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(endpoint_url) = std::env::var("DELIVERY_ENDPOINT_URL") {
            self.endpoint_url = endpoint_url;
        }
    }

    /// Get the endpoint URL as a parsed URL.
    pub fn endpoint_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.endpoint_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CoreError::Config(format!(
                "unsupported endpoint scheme: {}",
                other
            ))),
        }
    }
}
