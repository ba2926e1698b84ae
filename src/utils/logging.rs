use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_DIRECTIVE: &str = "herald_crawler=info";

/// Builds the filter from an explicit level, falling back to `RUST_LOG`, then
/// to [`DEFAULT_DIRECTIVE`].
pub fn build_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(format!("herald_crawler={}", level.to_lowercase())),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

/// Installs console logging plus a daily-rotated file in `log_dir`.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init(level: Option<&str>, log_dir: &Path, file_prefix: &str) -> anyhow::Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    Ok(guard)
}
