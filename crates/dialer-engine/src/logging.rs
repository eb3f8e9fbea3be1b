//! Tracing subscriber setup for binaries and tests embedding the dialer

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{DialerError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use when RUST_LOG is not set
    pub level: Level,
    /// Whether to emit JSON lines
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span open/close events
    pub log_spans: bool,
    /// Application name logged at startup
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "rvoip-dialer".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Fails with
/// [`DialerError::Configuration`] when a global subscriber is already set.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| DialerError::configuration(format!("logging already initialized: {}", e)))?;

    tracing::info!("Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Parse a log level name such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| DialerError::configuration(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_builder_flags() {
        let config = LoggingConfig::new(Level::DEBUG, "test").with_json().with_file_info();
        assert!(config.json);
        assert!(config.file_info);
        assert!(!config.log_spans);
    }
}
