//! Logging configuration and initialization

use crate::config::{LogOutput, LoggingConfig};
use crate::error::{Result, WatermarkError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the configured level. When logging to a
/// file the returned guard must be kept alive to flush buffered lines.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (layer, guard) = match config.output_type {
        LogOutput::Console => {
            let layer = if config.structured {
                tracing_subscriber::fmt::layer().json().boxed()
            } else {
                tracing_subscriber::fmt::layer().boxed()
            };
            (layer, None)
        }
        LogOutput::File => {
            let path = config.output_path.as_ref().ok_or_else(|| WatermarkError::LoggingError {
                message: "File logging requires output_path".to_string(),
            })?;
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().ok_or_else(|| WatermarkError::LoggingError {
                message: format!("Invalid log file path: {}", path.display()),
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if config.structured {
                tracing_subscriber::fmt::layer().json().with_writer(writer).boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed()
            };
            (layer, Some(guard))
        }
    };

    match tracing_subscriber::registry().with(env_filter).with(layer).try_init() {
        Ok(()) => Ok(guard),
        Err(e) => {
            let error_msg = e.to_string();
            if error_msg.contains("a global default trace dispatcher has already been set") {
                // Already initialised by an embedding application or another test
                Ok(guard)
            } else {
                Err(WatermarkError::LoggingError {
                    message: format!("Failed to initialize logging: {}", e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init() {
        // May race with other tests installing a subscriber, both outcomes are fine
        let _ = init_logging(&LoggingConfig::default());
    }

    #[test]
    fn test_file_logging_requires_path() {
        let config = LoggingConfig {
            output_type: LogOutput::File,
            output_path: None,
            ..LoggingConfig::default()
        };
        let err = init_logging(&config).unwrap_err();
        assert_eq!(err.error_type(), "logging_error");
    }
}
