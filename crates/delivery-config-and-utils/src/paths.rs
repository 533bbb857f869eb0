//! File system paths for the delivery service.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Base directory name under the user's home directory.
const BASE_DIR_NAME: &str = ".datapoint-delivery";
/// File name of the durable upload queue inside the queue directory.
const QUEUE_FILE_NAME: &str = "delivery.queue";
/// File name of the central JSONL log.
const LOG_FILE_NAME: &str = "delivery.jsonl";

/// Manages file system paths for the delivery service.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.datapoint-delivery)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.datapoint-delivery`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (`<base>/config.json`).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the queue directory (`<base>/<queue_directory>`).
    pub fn queue_dir(&self, queue_directory: &str) -> PathBuf {
        self.base_dir.join(queue_directory)
    }

    /// Get the queue file path (`<base>/<queue_directory>/delivery.queue`).
    pub fn queue_file(&self, queue_directory: &str) -> PathBuf {
        self.queue_dir(queue_directory).join(QUEUE_FILE_NAME)
    }

    /// Get the logs directory (`<base>/logs`).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central log file path (`<base>/logs/delivery.jsonl`).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Ensure the base and logs directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
