//! Pending requests and the priority queue they wait in.

use cohort_core::{CancellationToken, FhirResponse, Method, Priority, RetryBudget};
use cohort_error::RequestError;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// What a caller eventually receives.
pub(crate) type Outcome = Result<FhirResponse, RequestError>;

/// A logical request waiting for, or undergoing, dispatch.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) id: u64,
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) body: Option<JsonValue>,
    pub(crate) content_type: String,
    pub(crate) combinable: bool,
    pub(crate) cancel: CancellationToken,
    pub(crate) retries: RetryBudget,
    pub(crate) priority: Priority,
    /// Set on the first failed attempt and kept across retries
    pub(crate) first_failure: Option<Instant>,
    responder: Option<oneshot::Sender<Outcome>>,
}

impl PendingRequest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        method: Method,
        url: String,
        body: Option<JsonValue>,
        content_type: String,
        combinable: bool,
        cancel: CancellationToken,
        retries: RetryBudget,
        priority: Priority,
        responder: oneshot::Sender<Outcome>,
    ) -> Self {
        Self {
            id,
            method,
            url,
            body,
            content_type,
            combinable,
            cancel,
            retries,
            priority,
            first_failure: None,
            responder: Some(responder),
        }
    }

    /// Only GETs can share a batch.
    pub(crate) fn is_combinable(&self) -> bool {
        self.combinable && self.method == Method::Get
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// When this request first failed, recording now if it never has.
    pub(crate) fn mark_failed(&mut self) -> Instant {
        *self.first_failure.get_or_insert_with(Instant::now)
    }

    /// Settle the caller's future. A caller that stopped waiting is ignored.
    pub(crate) fn respond(mut self, outcome: Outcome) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(outcome);
        }
    }

    pub(crate) fn reject_cancelled(self) {
        self.respond(Err(RequestError::cancelled()));
    }
}

/// Queue ordered by priority, FIFO within a priority.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    items: VecDeque<PendingRequest>,
}

impl PendingQueue {
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Requests still waiting that nobody has cancelled.
    pub(crate) fn live_len(&self) -> usize {
        self.items.iter().filter(|r| !r.is_cancelled()).count()
    }

    /// Insert behind the last request of equal or higher priority.
    pub(crate) fn insert(&mut self, request: PendingRequest) {
        let position = self
            .items
            .iter()
            .rposition(|queued| queued.priority >= request.priority)
            .map_or(0, |index| index + 1);
        self.items.insert(position, request);
    }

    /// Put retried requests back at the head, keeping their relative order.
    pub(crate) fn push_front_all(&mut self, requests: Vec<PendingRequest>) {
        for request in requests.into_iter().rev() {
            self.items.push_front(request);
        }
    }

    fn pop_live(&mut self) -> Option<PendingRequest> {
        while let Some(request) = self.items.pop_front() {
            if request.is_cancelled() {
                debug!(id = request.id, "Skipping cancelled request");
                request.reject_cancelled();
                continue;
            }
            return Some(request);
        }
        None
    }

    /// Remove the next group to send as one network call.
    ///
    /// A non-combinable head goes alone. Otherwise combinable requests are
    /// taken up to `max_per_batch` or the first non-combinable one.
    /// Cancelled requests met on the way are rejected and do not count.
    pub(crate) fn select_next_group(
        &mut self,
        max_per_batch: usize,
        batching_enabled: bool,
    ) -> Vec<PendingRequest> {
        let Some(head) = self.pop_live() else {
            return Vec::new();
        };
        if !batching_enabled || !head.is_combinable() {
            return vec![head];
        }

        let mut group = vec![head];
        while group.len() < max_per_batch {
            match self.items.front() {
                Some(next) if next.is_cancelled() => {
                    if let Some(cancelled) = self.items.pop_front() {
                        debug!(id = cancelled.id, "Skipping cancelled request");
                        cancelled.reject_cancelled();
                    }
                }
                Some(next) if next.is_combinable() => {
                    if let Some(request) = self.items.pop_front() {
                        group.push(request);
                    }
                }
                _ => break,
            }
        }
        group
    }

    /// Reject everything still waiting.
    pub(crate) fn drain_with(&mut self, error: RequestError) {
        for request in self.items.drain(..) {
            request.respond(Err(error.clone()));
        }
    }
}
