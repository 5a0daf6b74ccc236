//! Layered configuration for the request client.
//!
//! Sources, later overriding earlier:
//! 1. Bundled defaults (`cohort.toml` compiled into the library)
//! 2. `~/.config/cohort/cohort.toml`
//! 3. `./cohort.toml`

use cohort_error::{CohortResult, ConfigError};
use config::{Config, File, FileFormat};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Scheduler and transport tunables.
///
/// ```toml
/// [client]
/// max_requests_per_batch = 10
/// max_active_requests = 6
/// batch_timeout_ms = 20
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum number of GETs merged into one batch bundle
    max_requests_per_batch: usize,
    /// Maximum number of network calls in flight
    max_active_requests: usize,
    /// Debounce before dispatching a partially filled batch (milliseconds)
    batch_timeout_ms: u64,
    /// Single GETs with longer URLs are sent as a one-entry batch POST
    max_url_length: usize,
    /// Per network call timeout (seconds)
    request_timeout_secs: u64,
    /// `User-Agent` header of the reqwest transport
    user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_requests_per_batch: 10,
            max_active_requests: 6,
            batch_timeout_ms: 20,
            max_url_length: 1800,
            request_timeout_secs: 60,
            user_agent: format!("cohort/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Debounce as a duration.
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests_per_batch == 0 {
            return Err(ConfigError::invalid("max_requests_per_batch", "must be at least 1"));
        }
        if self.max_active_requests == 0 {
            return Err(ConfigError::invalid("max_active_requests", "must be at least 1"));
        }
        Ok(())
    }
}

/// Retry, give-up and pacing settings.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
#[serde(default)]
pub struct RetryConfig {
    /// No retries once this long has passed since the last success (seconds)
    give_up_window_secs: u64,
    /// Aborts faster than this are treated as provider rate limiting (seconds)
    preflight_window_secs: u64,
    /// Delay before a retry when the server sent no usable `Retry-After` (milliseconds)
    default_retry_delay_ms: u64,
    /// Window the rate-limit header refers to (milliseconds)
    rate_period_ms: u64,
    /// Safety margin added to the rate window (milliseconds)
    pacing_margin_ms: u64,
    /// Header carrying the request limit
    rate_limit_header: String,
    /// Retries per request; `None` retries until the give-up window closes
    default_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            give_up_window_secs: 90,
            preflight_window_secs: 15,
            default_retry_delay_ms: 1000,
            rate_period_ms: 1000,
            pacing_margin_ms: 50,
            rate_limit_header: "x-ratelimit-limit".to_string(),
            default_retries: None,
        }
    }
}

impl RetryConfig {
    /// Give-up window as a duration.
    pub fn give_up_window(&self) -> Duration {
        Duration::from_secs(self.give_up_window_secs)
    }

    /// Preflight window as a duration.
    pub fn preflight_window(&self) -> Duration {
        Duration::from_secs(self.preflight_window_secs)
    }

    /// Default retry delay as a duration.
    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }
}

/// Response cache settings.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the filesystem store for named caches
    durable: bool,
    /// Root of the filesystem store; defaults to the platform cache directory
    directory: Option<PathBuf>,
    /// Expiration applied when a caller passes none
    default_expiration_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            durable: true,
            directory: None,
            default_expiration_seconds: None,
        }
    }
}

impl CacheConfig {
    /// Directory of the filesystem store.
    pub fn resolved_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("cohort")))
    }
}

/// Top-level configuration.
///
/// # Example
///
/// ```no_run
/// use cohort_core::CohortConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CohortConfig::load()?;
/// println!("batch size: {}", config.client().max_requests_per_batch());
/// # Ok(())
/// # }
/// ```
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct CohortConfig {
    /// Scheduler and transport
    client: ClientConfig,
    /// Retry and pacing
    retry: RetryConfig,
    /// Response cache
    cache: CacheConfig,
}

/// Bundled defaults.
const DEFAULT_CONFIG: &str = include_str!("../../../cohort.toml");

impl CohortConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> CohortResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.client.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: current dir > home dir > bundled defaults.
    ///
    /// User config files are optional and silently skipped when absent.
    #[instrument]
    pub fn load() -> CohortResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/cohort/cohort.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("cohort").required(false));

        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.client.validate()?;
        Ok(config)
    }
}
