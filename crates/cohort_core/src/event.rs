//! Observability events emitted by the request client.

use serde::{Deserialize, Serialize};

/// Events the UI layer subscribes to.
///
/// The client never renders anything; collaborators turn these into
/// warnings or settings updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ClientEvent {
    /// A batch POST aborted and its requests were re-sent individually
    BatchIssue {
        /// Number of requests in the failed batch
        size: usize,
        /// Transport diagnostics
        message: String,
    },
    /// A request sent on its own failed
    SingleRequestFailure {
        /// Request URL
        url: String,
        /// HTTP status, 0 for aborts
        status: u16,
        /// Diagnostics
        message: String,
    },
    /// Tunables changed as a consequence of server behaviour
    ParametersChanged {
        /// Current concurrency cap
        max_active_requests: usize,
        /// Current batch size cap
        max_requests_per_batch: usize,
        /// Current pacing interval in milliseconds
        pacing_interval_ms: u64,
    },
}
