//! Request rejection types.
//!
//! Every request that does not resolve with a response rejects with a
//! [`RequestError`]. The shape mirrors what UI collaborators consume:
//! an HTTP status (0 for a transport abort), a human readable message and,
//! on 401 responses, the raw `WWW-Authenticate` challenge.

/// Status used for requests that never produced an HTTP status.
pub const ABORT_STATUS: u16 = 0;

/// Failure taxonomy for a single logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum RequestErrorKind {
    /// Request was cancelled or the transport aborted.
    ///
    /// `caller` is true when the caller's cancellation token fired, false when
    /// the network layer gave up on its own.
    #[display("request aborted (caller initiated: {})", caller)]
    Abort {
        /// Whether the abort was requested by the caller
        caller: bool,
    },
    /// Server answered 429 Too Many Requests
    #[display("rate limited")]
    RateLimited,
    /// Any other non-success status
    #[display("HTTP {}", _0)]
    Http(u16),
}

/// Rejection payload of a request with location tracking.
///
/// # Examples
///
/// ```
/// use cohort_error::{RequestError, RequestErrorKind};
///
/// let err = RequestError::from_status(404, "Unknown resource type", None);
/// assert_eq!(err.kind, RequestErrorKind::Http(404));
/// assert_eq!(err.status, 404);
///
/// let cancelled = RequestError::cancelled();
/// assert!(cancelled.is_cancelled());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Request Error: {} (status {}): {} at line {} in {}", kind, status, message, line, file)]
pub struct RequestError {
    /// Failure class
    pub kind: RequestErrorKind,
    /// HTTP status, [`ABORT_STATUS`] for aborts
    pub status: u16,
    /// Diagnostics from the server or the transport
    pub message: String,
    /// `WWW-Authenticate` challenge of a 401 response
    pub www_authenticate: Option<String>,
    /// Line number where the error was created
    pub line: u32,
    /// File where the error was created
    pub file: &'static str,
}

impl RequestError {
    /// Create a new request error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RequestErrorKind, status: u16, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            status,
            message: message.into(),
            www_authenticate: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Classify an HTTP status into a request error.
    #[track_caller]
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        www_authenticate: Option<String>,
    ) -> Self {
        let kind = match status {
            ABORT_STATUS => RequestErrorKind::Abort { caller: false },
            429 => RequestErrorKind::RateLimited,
            other => RequestErrorKind::Http(other),
        };
        let mut err = Self::new(kind, status, message);
        err.www_authenticate = www_authenticate;
        err
    }

    /// The caller cancelled the request.
    #[track_caller]
    pub fn cancelled() -> Self {
        Self::new(
            RequestErrorKind::Abort { caller: true },
            ABORT_STATUS,
            "request cancelled",
        )
    }

    /// The network layer aborted the request without caller involvement.
    #[track_caller]
    pub fn transport_abort(message: impl Into<String>) -> Self {
        Self::new(RequestErrorKind::Abort { caller: false }, ABORT_STATUS, message)
    }

    /// True when the caller's cancellation caused this rejection.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, RequestErrorKind::Abort { caller: true })
    }

    /// True for any abort, caller initiated or not.
    pub fn is_abort(&self) -> bool {
        matches!(self.kind, RequestErrorKind::Abort { .. })
    }
}
