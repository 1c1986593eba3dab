//! Structured operation logging and subscriber setup.

use tracing::{info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{EngineError, EngineResult};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT=json` selects JSON output.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives are honored on top of `vframe=info`. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> EngineResult<()> {
    let directive = "vframe=info"
        .parse()
        .map_err(|e| EngineError::config(format!("invalid log directive: {}", e)))?;
    let env_filter = EnvFilter::from_default_env().add_directive(directive);

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init(),
    };

    result.map_err(|e| EngineError::config(format!("failed to install tracing subscriber: {}", e)))
}

/// Logger for build and sync operations on one collection.
#[derive(Debug, Clone)]
pub struct OperationLogger {
    collection: String,
    operation: String,
}

impl OperationLogger {
    pub fn new(collection: &str, operation: &str) -> Self {
        Self {
            collection: collection.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            collection = %self.collection,
            operation = %self.operation,
            "Started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            collection = %self.collection,
            operation = %self.operation,
            "Progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            collection = %self.collection,
            operation = %self.operation,
            "Warning: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            collection = %self.collection,
            operation = %self.operation,
            "Completed: {}", message
        );
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the collection and operation.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "frames",
            collection = %self.collection,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_operation_logger() {
        let logger = OperationLogger::new("quickstart-video", "build");
        assert_eq!(logger.collection(), "quickstart-video");
        assert_eq!(logger.operation(), "build");
        logger.log_start("planning 3 videos");
    }

    #[test]
    #[serial]
    fn test_log_format_from_env() {
        std::env::set_var("LOG_FORMAT", "JSON");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);
        std::env::set_var("LOG_FORMAT", "text");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
        std::env::remove_var("LOG_FORMAT");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(LogFormat::Pretty);
        tokio_test::assert_err!(init_tracing(LogFormat::Json));
    }
}
