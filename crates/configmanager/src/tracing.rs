//! Tracing configuration for the configmanager CLI
//!
//! Logs go to stderr so that standard output stays reserved for resolved
//! values. `RUST_LOG` overrides the level chosen on the command line.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Crates whose events the default filter lets through
const CRATES: [&str; 6] = [
    "configmanager",
    "configmanager_secrets",
    "configmanager_aws",
    "configmanager_azure",
    "configmanager_gcp",
    "configmanager_vault",
];

/// Tracing output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Show all logs (trace level)
    Trace,
    /// Show debug and above
    Debug,
    /// Show info and above
    Info,
    /// Show warnings and above (default)
    Warn,
    /// Show errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Level for the configmanager crates when `RUST_LOG` is unset
    pub level: Level,
    /// Explicit filter directive, overriding both `level` and `RUST_LOG`
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
            filter: None,
        }
    }
}

/// Global correlation ID for tracing request correlation
static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Get or create a correlation ID for the current process
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Filter directive enabling `level` for every configmanager crate
#[must_use]
pub fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a subscriber is
/// already installed.
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let correlation_id = correlation_id();

    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive(config.level)))
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true);
            registry
                .with(layer)
                .try_init()
                .map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false);
            registry
                .with(layer)
                .try_init()
                .map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);
            registry
                .with(layer)
                .try_init()
                .map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;
        }
    }

    tracing::debug!(
        correlation_id = %correlation_id,
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "tracing initialized"
    );

    Ok(())
}

/// Span every command of a CLI invocation runs under
#[must_use]
pub fn command_span(command: &str) -> tracing::Span {
    tracing::info_span!(
        "command",
        command,
        correlation_id = %correlation_id(),
        start_time = %chrono::Utc::now().to_rfc3339(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_default_directive_covers_every_crate() {
        let directive = default_directive(Level::DEBUG);
        for name in CRATES {
            assert!(directive.contains(&format!("{name}=debug")), "{directive}");
        }
        assert!(EnvFilter::try_new(directive).is_ok());
    }

    #[test]
    fn test_correlation_id_is_stable() {
        assert_eq!(correlation_id(), correlation_id());
    }

    #[test]
    fn test_default_config_is_quiet() {
        let config = TracingConfig::default();
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, TracingFormat::Compact);
    }
}
