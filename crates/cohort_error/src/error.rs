//! Top-level error wrapper types.

use crate::{CacheError, ConfigError, HttpError, NegotiationError, RequestError};

/// Every error the Cohort crates surface, by layer.
///
/// # Examples
///
/// ```
/// use cohort_error::{CohortError, HttpError};
///
/// let http_err = HttpError::new("Connection failed");
/// let err: CohortError = http_err.into();
/// assert!(format!("{}", err).contains("HTTP Error"));
/// ```
#[derive(Debug, Clone, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum CohortErrorKind {
    /// Raw HTTP transport error
    #[from(HttpError)]
    Http(HttpError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Response cache error
    #[from(CacheError)]
    Cache(CacheError),
    /// Logical request rejection
    #[from(RequestError)]
    Request(RequestError),
    /// Capability negotiation failure
    #[from(NegotiationError)]
    Negotiation(NegotiationError),
}

/// Cohort error with kind discrimination.
///
/// # Examples
///
/// ```
/// use cohort_error::{CohortResult, ConfigError};
///
/// fn might_fail() -> CohortResult<()> {
///     Err(ConfigError::new("Missing field"))?
/// }
///
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Cohort Error: {}", _0)]
pub struct CohortError(Box<CohortErrorKind>);

impl CohortError {
    /// Create a new error from a kind.
    pub fn new(kind: CohortErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CohortErrorKind {
        &self.0
    }

    /// The request rejection inside this error, if it is one.
    pub fn as_request(&self) -> Option<&RequestError> {
        match self.kind() {
            CohortErrorKind::Request(err) => Some(err),
            CohortErrorKind::Negotiation(err) => match &err.kind {
                crate::NegotiationErrorKind::Request(inner) => Some(inner),
                _ => None,
            },
            _ => None,
        }
    }

    /// True when the underlying request was cancelled by its caller.
    pub fn is_cancelled(&self) -> bool {
        self.as_request().is_some_and(RequestError::is_cancelled)
    }
}

// Generic From implementation for any type that converts to CohortErrorKind
impl<T> From<T> for CohortError
where
    T: Into<CohortErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Cohort operations.
pub type CohortResult<T> = std::result::Result<T, CohortError>;
