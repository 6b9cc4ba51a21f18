use crate::storage::{Config, Paths};
use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PINBOARD_LOG";

/// Routes tracing output to a daily log file, since the TUI owns the
/// terminal. Keep the guard alive until exit so buffered lines get flushed.
pub fn init(paths: &Paths, config: &Config) -> Result<WorkerGuard> {
    fs::create_dir_all(&paths.log_dir)
        .with_context(|| format!("creating {:?}", paths.log_dir))?;
    let appender = tracing_appender::rolling::daily(&paths.log_dir, "pinboard.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or("info"))
    })
}
