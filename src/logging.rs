//! Log file setup for the command-line tool

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::log_path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Route `tracing` output to `<cache_dir>/metadata-cache.log`.
///
/// The level comes from `RUST_LOG` and defaults to `info`. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init_logging(cache_dir: &Path, format: LogFormat) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create log directory {:?}", cache_dir))?;

    let path = log_path(cache_dir);
    let file_name = path
        .file_name()
        .context("Log path has no file name")?
        .to_owned();
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(cache_dir, file_name));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init(),
    };
    result.context("Failed to initialize tracing subscriber")?;

    Ok(guard)
}
