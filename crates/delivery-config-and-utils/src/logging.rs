//! Logging initialization for the delivery service.
//!
//! Thin wrapper over the observability crate so callers only pass a level
//! and the resolved [`Paths`].

use crate::Paths;

/// Service name stamped on every log line.
const SERVICE_NAME: &str = "delivery";

/// Initialize the logging system.
///
/// Writes structured JSONL to `<base>/logs/delivery.jsonl`. `RUST_LOG`
/// overrides `level` when set.
///
/// ```ignore
/// init_logging("info", &paths)?;
/// tracing::info!("delivery manager ready");
/// ```
pub fn init_logging(level: &str, paths: &Paths) -> std::io::Result<()> {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr: std::env::var("DELIVERY_LOG_STDERR").is_ok(),
    })
}
