use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize tracing. RUST_LOG wins over the configured level; with a log
/// directory set, output goes to a daily-rolling file through a
/// non-blocking writer whose guard must stay alive for the process.
pub fn init(level: Option<&str>, log_directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter_str =
        std::env::var("RUST_LOG").unwrap_or_else(|_| level.unwrap_or("info").to_string());
    let env_filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow!("invalid log filter '{}': {}", filter_str, e))?;

    match log_directory {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::daily(directory, "exitstat.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow!("initializing tracing subscriber: {}", e))?;
            tracing::info!(directory = %directory.display(), filter = %filter_str, "logging to file");
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow!("initializing tracing subscriber: {}", e))?;
            Ok(None)
        }
    }
}
