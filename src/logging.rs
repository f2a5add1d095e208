use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::HookError;

/// Prefix for rotated log files
const LOG_FILE_PREFIX: &str = "jekyll_hook";

/// Initializes the global subscriber: console output, plus a daily-rotated
/// file when `log_dir` is configured. The returned guard must be held for
/// the lifetime of the process so buffered lines are flushed on shutdown.
pub fn init(log_dir: Option<&str>) -> Result<Option<WorkerGuard>, HookError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "jekyll_hook=info".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_dir {
        Some(dir) => {
            // Ensure log directory exists
            fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}
