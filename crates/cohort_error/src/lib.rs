//! Error types for the Cohort FHIR request client.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Request rejections ([`RequestError`]) carry the status/message/challenge
//! triple that UI collaborators display, so they are kept flat rather than
//! nested under a kind enum of kinds.
//!
//! # Examples
//!
//! ```
//! use cohort_error::{CohortResult, RequestError};
//!
//! fn fetch_patient() -> CohortResult<String> {
//!     Err(RequestError::from_status(404, "Patient/123 not found", None))?
//! }
//!
//! assert!(fetch_patient().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod http;
mod negotiation;
mod request;

pub use cache::{CacheError, CacheErrorKind};
pub use config::ConfigError;
pub use error::{CohortError, CohortErrorKind, CohortResult};
pub use http::HttpError;
pub use negotiation::{NegotiationError, NegotiationErrorKind};
pub use request::{ABORT_STATUS, RequestError, RequestErrorKind};
