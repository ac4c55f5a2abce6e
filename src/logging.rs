use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "skinvault.log";

/// Log to stdout and to a daily rotating file in `<data_dir>/logs`.
///
/// `RUST_LOG` wins over `level`. Keep the returned guard alive until exit or
/// buffered file output is lost.
pub fn init_logging(data_dir: &Path, level: &str) -> Result<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow!("Failed to create log directory '{}': {}", log_dir.display(), e))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::debug!("Logging to {}/{}.<date>", log_dir.display(), LOG_FILE_PREFIX);
    Ok(guard)
}
