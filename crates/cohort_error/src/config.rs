//! Invalid or unreadable configuration.

use std::fmt;

/// Configuration could not be loaded, or a setting holds a value the
/// client cannot run with.
#[derive(Debug, Clone, derive_more::Error)]
pub struct ConfigError {
    /// Setting at fault, when one is
    pub setting: Option<&'static str>,
    /// What is wrong
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Loading or installing configuration failed as a whole.
    ///
    /// # Examples
    ///
    /// ```
    /// use cohort_error::ConfigError;
    ///
    /// let err = ConfigError::new("Failed to parse configuration: expected `=`");
    /// assert!(err.setting.is_none());
    /// assert!(err.to_string().starts_with("Configuration Error: Failed to parse"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            setting: None,
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }

    /// One setting holds an unusable value.
    ///
    /// # Examples
    ///
    /// ```
    /// use cohort_error::ConfigError;
    ///
    /// let err = ConfigError::invalid("max_requests_per_batch", "must be at least 1");
    /// assert_eq!(err.setting, Some("max_requests_per_batch"));
    /// assert!(err
    ///     .to_string()
    ///     .starts_with("Configuration Error: max_requests_per_batch must be at least 1"));
    /// ```
    #[track_caller]
    pub fn invalid(setting: &'static str, message: impl Into<String>) -> Self {
        Self {
            setting: Some(setting),
            ..Self::new(message)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration Error: ")?;
        if let Some(setting) = self.setting {
            write!(f, "{} ", setting)?;
        }
        write!(f, "{} at line {} in {}", self.message, self.line, self.file)
    }
}

