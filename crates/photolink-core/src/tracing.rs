//! Logging setup shared by the photolink binary and tests.
//!
//! ```ignore
//! use photolink_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli(args.debug))?;
//! ```
//!
//! `RUST_LOG` always wins over the configured default level.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// How the subscriber is assembled.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to `photolink*` targets when `RUST_LOG` is unset.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Emit file and line of the call site.
    pub include_location: bool,
    pub include_timestamp: bool,
    /// Explicit filter directive; replaces both `RUST_LOG` and `default_level`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::WARN,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_timestamp: true,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Compact stderr logging for the command line.
    ///
    /// Quiet (warnings only) unless `debug` is set. Logs go to stderr so that
    /// command output on stdout stays machine readable.
    #[must_use]
    pub fn cli(debug: bool) -> Self {
        Self {
            default_level: if debug { Level::DEBUG } else { Level::WARN },
            output_format: TracingOutputFormat::Compact,
            include_location: debug,
            include_timestamp: debug,
            env_filter: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.env_filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(self.default_level)))),
        }
    }
}

fn default_directive(level: Level) -> String {
    format!("photolink={level}")
}

fn output_layer(config: &TracingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match (config.output_format, config.include_timestamp) {
        (TracingOutputFormat::Pretty, _) => base.pretty().boxed(),
        (TracingOutputFormat::Compact, true) => base.compact().boxed(),
        (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
        (TracingOutputFormat::Json, _) => base.json().boxed(),
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let subscriber = tracing_subscriber::registry()
        .with(output_layer(&config))
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_config_is_quiet_by_default() {
        let config = TracingConfig::cli(false);
        assert_eq!(config.default_level, Level::WARN);
        assert_eq!(config.output_format, TracingOutputFormat::Compact);
        assert!(!config.include_location);
    }

    #[test]
    fn cli_debug_raises_level() {
        let config = TracingConfig::cli(true);
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(config.include_location);
        assert!(config.include_timestamp);
    }

    #[test]
    fn default_directive_targets_all_crates() {
        assert_eq!(default_directive(Level::INFO), "photolink=INFO");
    }

    #[test]
    fn explicit_filter_is_validated() {
        let config = TracingConfig::default().with_env_filter("photolink_core=trace");
        assert!(config.filter().is_ok());

        let bad = TracingConfig::default().with_env_filter("photolink=notalevel");
        assert!(matches!(bad.filter(), Err(TracingError::EnvFilter(_))));
    }
}
