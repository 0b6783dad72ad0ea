//! Logging setup
//!
//! One `tracing` subscriber for the whole process: an `EnvFilter` plus a
//! single fmt layer in the configured format.

use crate::config_error;
use crate::error::WardenResult;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    pub include_thread: bool,
    /// Append to this file instead of stdout
    pub log_file_path: Option<String>,
    /// Emit a span-close event with timing for every span
    pub span_timing: bool,
    /// Extra filter directives, e.g. `tower_http=debug`
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            log_file_path: None,
            span_timing: false,
            filter_directives: vec![
                "warden_web=debug".to_string(),
                "warden_auth=debug".to_string(),
                "tower_http=info".to_string(),
                "sqlx=warn".to_string(),
            ],
        }
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_logging(config: &LoggingConfig) -> WardenResult<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for directive in &config.filter_directives {
        let directive = directive
            .parse()
            .map_err(|e| config_error!(format!("invalid filter directive '{}'", directive), "logging", e))?;
        filter = filter.add_directive(directive);
    }

    let writer = match &config.log_file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stdout),
    };

    let span_events = if config.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread);

    let fmt_layer = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| config_error!("logging already initialized", "logging", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.log_file_path.is_none());
    }

    #[test]
    fn test_invalid_directive_is_reported() {
        let config = LoggingConfig {
            filter_directives: vec!["warden_web=notalevel".to_string()],
            ..LoggingConfig::default()
        };

        assert!(init_logging(&config).is_err());
    }
}
