//! Logging bootstrap for binaries and tests built on Cohort.

use cohort_error::{CohortResult, ConfigError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of log lines.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
///
/// # Examples
///
/// ```
/// use cohort::{LogFormat, LoggingConfig};
///
/// let config = LoggingConfig::default()
///     .with_filter("debug,reqwest=warn")
///     .with_format(LogFormat::Json);
/// assert_eq!(config.filter, "debug,reqwest=warn");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_setters::Setters)]
#[setters(prefix = "with_", into)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Line format
    pub format: LogFormat,
    /// Include the event target
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
            show_target: false,
        }
    }
}

impl LoggingConfig {
    /// Configuration for a command-line run, `debug` when verbose.
    pub fn for_cli(verbose: bool) -> Self {
        let filter = if verbose { "debug" } else { "info" };
        Self::default().with_filter(filter)
    }

    /// The filter in effect: `RUST_LOG` when set, else the configured directives.
    pub fn env_filter(&self) -> CohortResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter).map_err(|e| {
                ConfigError::new(format!("Invalid log filter '{}': {}", self.filter, e)).into()
            }),
        }
    }

    pub(crate) fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        match self.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(self.show_target)
                .with_level(true)
                .boxed(),
            LogFormat::Text => tracing_subscriber::fmt::layer()
                .with_target(self.show_target)
                .with_level(true)
                .boxed(),
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// # Errors
///
/// Fails when the filter directives are invalid or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> CohortResult<()> {
    let env_filter = config.env_filter()?;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(config.fmt_layer())
        .try_init()
        .map_err(|e| ConfigError::new(format!("Failed to install log subscriber: {}", e)))?;
    Ok(())
}
