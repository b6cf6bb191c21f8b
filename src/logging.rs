//! Installation of the process-wide log subscriber.
//!
//! Library code logs through the `log` facade. The binary installs a
//! `tracing-subscriber` formatter, which also captures `log` records.

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// Filter used when neither a level nor `RUST_LOG` is given.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Explicit filter directive such as `debug` or `cdr_relay=trace`.
    /// Overrides `RUST_LOG` when set.
    pub filter: Option<String>,
    /// Include source file and line in each event.
    pub file_info: bool,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match config.filter.as_deref() {
        Some(directive) => Ok(EnvFilter::try_new(directive)?),
        None => Ok(EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(config.file_info)
        .with_line_number(config.file_info)
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directives() {
        let config = LoggingConfig {
            filter: Some("cdr_relay=loud".into()),
            ..LoggingConfig::default()
        };
        assert!(matches!(build_filter(&config), Err(LoggingError::Filter(_))));
    }

    #[test]
    fn accepts_module_directives() {
        let config = LoggingConfig {
            filter: Some("warn,cdr_relay::delivery=debug".into()),
            ..LoggingConfig::default()
        };
        assert!(build_filter(&config).is_ok());
    }
}
