use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LogSettings};
use crate::error::{Error, Result};

/// File name prefix of rolling log files
pub const LOG_FILE_PREFIX: &str = "monitoring-stack-operator.log";

/// Keeps the file writer alive; dropping it flushes buffered lines.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Builds the filter from `RUST_LOG` if set, else from the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber: console output plus optional daily
/// rolling files, in text or JSON.
pub fn init_logging(settings: &LogSettings) -> Result<LoggingGuard> {
    let console = match settings.format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let (file, guard) = match &settings.directory {
        Some(directory) => {
            fs::create_dir_all(directory)?;
            let (writer, guard) = non_blocking(rolling::daily(directory, LOG_FILE_PREFIX));
            let layer = match settings.format {
                LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&settings.level))
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    tracing::info!(
        level = %settings.level,
        format = settings.format.as_str(),
        directory = ?settings.directory,
        "logging initialized"
    );

    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_falls_back() {
        // must not panic on garbage directives
        let _ = env_filter("not a [valid directive");
    }

    #[test]
    fn file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("logs");
        let settings = LogSettings {
            level: "debug".into(),
            format: LogFormat::Json,
            directory: Some(target.clone()),
        };

        // another test may have installed a global subscriber already
        let result = init_logging(&settings);
        assert!(target.is_dir());
        if let Ok(guard) = result {
            tracing::info!("written to file");
            drop(guard);
        }
    }
}
