//! File logging for the host application.
//!
//! Logs go to `<data dir>/logs/markly.log.YYYY-MM-DD` through a non-blocking writer.
//! Keep the returned guard alive for the lifetime of the process; dropping it
//! flushes buffered lines.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::storage::StorageConfig;

pub const DEBUG_LOG_ENV: &str = "MARKLY_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "markly.log";

/// Installs the global subscriber. Returns `None` if one is already set or the
/// log directory cannot be created.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let logs_dir = storage.logs_dir();
    if let Err(err) = fs_err::create_dir_all(&logs_dir) {
        eprintln!("markly: failed to create log directory: {}", err);
        return None;
    }

    let appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter_from(env::var(DEBUG_LOG_ENV).ok().as_deref()))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()
        .map(|()| guard)
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

fn filter_from(debug_flag: Option<&str>) -> EnvFilter {
    if debug_enabled(debug_flag) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
