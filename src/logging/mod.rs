//! Tracing subscriber setup
//!
//! One `Registry` with an `EnvFilter` and a fmt layer writing to stderr,
//! JSON or human-readable. Stdout stays free for command output.
//!
//! Filter precedence: an explicit override (the CLI's `--log-level`), then
//! `RUST_LOG`, then `logging.level` from settings.

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during subscriber initialization
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter for the given settings
pub fn build_filter(
    config: &LoggingConfig,
    override_level: Option<&str>,
) -> Result<EnvFilter, LoggingError> {
    let parse = |directive: &str| {
        EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
            directive: directive.to_string(),
            message: e.to_string(),
        })
    };

    if let Some(level) = override_level {
        return parse(level);
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse(&config.level),
    }
}

/// Install the global subscriber
pub fn init_subscriber(
    config: &LoggingConfig,
    override_level: Option<&str>,
) -> Result<(), LoggingError> {
    let env_filter = build_filter(config, override_level)?;

    if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_writer(std::io::stderr);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let config = LoggingConfig {
            level: "info".into(),
            json: false,
        };
        let filter = build_filter(&config, Some("debug")).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let config = LoggingConfig::default();
        let result = build_filter(&config, Some("clipvault=notalevel"));
        assert!(matches!(result, Err(LoggingError::InvalidFilter { .. })));
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            level: "warn".into(),
            json: true,
        };
        // Another test binary thread may have installed one first
        let _ = init_subscriber(&config, None);
        assert!(matches!(
            init_subscriber(&config, None),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}
