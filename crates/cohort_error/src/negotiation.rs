//! Capability negotiation errors.

use crate::RequestError;

/// Terminal outcomes of a capability negotiation that did not complete.
#[derive(Debug, Clone, derive_more::Display)]
pub enum NegotiationErrorKind {
    /// The server reported a FHIR version the client does not know
    #[display("UNSUPPORTED_VERSION: {}", _0)]
    UnsupportedVersion(String),
    /// The server challenged with HTTP Basic authentication
    #[display("BASIC_AUTH_REQUIRED")]
    BasicAuthRequired,
    /// The server challenged with a Bearer token
    #[display("OAUTH2_REQUIRED")]
    OAuth2Required,
    /// Negotiation was superseded by a newer server or context
    #[display("outdated negotiation")]
    Outdated,
    /// The metadata request itself failed
    #[display("{}", _0)]
    Request(RequestError),
}

/// Negotiation error with location tracking.
///
/// # Examples
///
/// ```
/// use cohort_error::{NegotiationError, NegotiationErrorKind};
///
/// let err = NegotiationError::new(NegotiationErrorKind::OAuth2Required);
/// assert!(format!("{}", err).contains("OAUTH2_REQUIRED"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Negotiation Error: {} at line {} in {}", kind, line, file)]
pub struct NegotiationError {
    /// The kind of error that occurred
    pub kind: NegotiationErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl NegotiationError {
    /// Create a new negotiation error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: NegotiationErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// True when the negotiation was superseded rather than failed.
    pub fn is_outdated(&self) -> bool {
        matches!(self.kind, NegotiationErrorKind::Outdated)
    }
}

impl From<RequestError> for NegotiationError {
    #[track_caller]
    fn from(err: RequestError) -> Self {
        Self::new(NegotiationErrorKind::Request(err))
    }
}
