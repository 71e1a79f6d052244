//! Tracing subscriber setup

use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{
    filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::ScrapeError;

pub const LOG_FILE_PREFIX: &str = "roundtrip-flights.log";

/// Where log output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Human-readable lines on stderr
    Stderr,
    /// JSON lines in a daily-rotated file under the directory
    RollingFile(PathBuf),
}

/// Filter from `RUST_LOG`, falling back to the crate at the given level
pub fn build_filter(default_level: &str) -> Result<EnvFilter, ScrapeError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => {
            let directive = format!("roundtrip_flights={}", default_level)
                .parse::<Directive>()
                .map_err(|e| {
                    ScrapeError::Config(format!("Invalid log level '{}': {}", default_level, e))
                })?;
            Ok(EnvFilter::new("warn").add_directive(directive))
        }
    }
}

/// Initialize global logging. Call once, early in `main`.
pub fn init_logging(target: LogTarget, default_level: &str) -> Result<(), ScrapeError> {
    let filter = build_filter(default_level)?;

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .init();
        }
        LogTarget::RollingFile(log_dir) => {
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .json(),
                )
                .init();

            info!(log_dir = %log_dir.display(), "Logging to rotating JSON files");
        }
    }

    debug!("Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_levels() {
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("info").is_ok());
    }
}
