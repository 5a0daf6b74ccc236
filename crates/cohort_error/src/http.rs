//! Transport failures.

use std::fmt;

/// The request never produced an HTTP response (refused connection, TLS,
/// timeout, unreadable body).
///
/// Carries the URL being fetched when the transport knows it, so a batch
/// falling back to plain requests can still say which call broke.
#[derive(Debug, Clone, derive_more::Error)]
pub struct HttpError {
    /// What the transport reported
    pub message: String,
    /// Absolute URL of the failed call
    pub url: Option<String>,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl HttpError {
    /// Record a transport failure at the caller's location.
    ///
    /// # Examples
    ///
    /// ```
    /// use cohort_error::HttpError;
    ///
    /// let err = HttpError::new("Connection refused");
    /// assert!(err.message.contains("Connection refused"));
    /// assert!(err.url.is_none());
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            url: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Attach the URL of the failed call.
    ///
    /// # Examples
    ///
    /// ```
    /// use cohort_error::HttpError;
    ///
    /// let err = HttpError::new("connection reset").with_url("https://fhir.test/r4/Patient/1");
    /// assert!(err
    ///     .to_string()
    ///     .starts_with("HTTP Error: connection reset (https://fhir.test/r4/Patient/1) at line"));
    /// ```
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP Error: {}", self.message)?;
        if let Some(url) = &self.url {
            write!(f, " ({})", url)?;
        }
        write!(f, " at line {} in {}", self.line, self.file)
    }
}
