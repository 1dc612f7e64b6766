//! Logging Setup
//!
//! Console output through `tracing-subscriber`, plus an optional
//! daily-rolling log file when a log directory is configured.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "dev_agency=info";

/// Keeps the file writer flushing until dropped
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(log_dir: Option<&Path>) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dev_agency.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }

    LoggingGuard { _file_guard: file_guard }
}
