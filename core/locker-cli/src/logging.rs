//! File logging for the CLI.
//!
//! Writes to a daily-rolling file under `~/.stroop-locker/logs` so terminal
//! output stays clean. `RUST_LOG` overrides the default `info` filter.

use locker_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "strooplock.log";

/// Keep the returned guard alive for the life of the process; dropping it
/// flushes buffered log lines.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let logs_dir = storage.logs_dir();
    if let Err(err) = fs_err::create_dir_all(&logs_dir) {
        eprintln!("strooplock: logging disabled: {}", err);
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init();

    match result {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}
