//! Physical calls: plain requests, batch bundles and batch response splitting.

use crate::pending::PendingRequest;
use crate::scheduler::SchedulerMessage;
use crate::transport::{Transport, TransportRequest};
use crate::url::relative_url;
use cohort_core::{
    BatchBundle, BatchResponseBundle, CancellationToken, ClientEvent, FHIR_JSON, FhirResponse,
    Method, operation_outcome_diagnostics,
};
use cohort_error::{ABORT_STATUS, RequestError};
use cohort_rate_limit::{FailedAttempt, RetryDecision, RetryPolicy};
use futures::future::join_all;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// How a dispatched group goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallShape {
    /// The request as is
    Plain,
    /// A `batch` bundle POSTed to the server base
    Batch,
}

/// Failure details of one physical call.
struct Failure<'a> {
    status: u16,
    message: String,
    www_authenticate: Option<String>,
    headers: Option<&'a HeaderMap>,
    elapsed: Duration,
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Diagnostics of an error body, else the reason phrase of the status.
fn diagnostics(body: &JsonValue, status: u16) -> String {
    let text = operation_outcome_diagnostics(body);
    if !text.is_empty() {
        return text;
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn challenge(status: u16, headers: &HeaderMap) -> Option<String> {
    if status != 401 {
        return None;
    }
    headers
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Report `error` once: the first live request gets it, the rest are cancelled.
fn reject_group(group: Vec<PendingRequest>, error: RequestError) {
    let mut reported = false;
    for request in group {
        if !reported && !request.is_cancelled() {
            reported = true;
            request.respond(Err(error.clone()));
        } else {
            request.reject_cancelled();
        }
    }
}

/// Sends groups chosen by the scheduler and settles their callers.
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    policy: Arc<RetryPolicy>,
    events: broadcast::Sender<ClientEvent>,
    server_url: watch::Receiver<String>,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        policy: Arc<RetryPolicy>,
        events: broadcast::Sender<ClientEvent>,
        server_url: watch::Receiver<String>,
    ) -> Self {
        Self {
            transport,
            policy,
            events,
            server_url,
        }
    }

    pub(crate) fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Perform one physical call for `group`, then release the active slot.
    pub(crate) async fn run(
        self: Arc<Self>,
        group: Vec<PendingRequest>,
        shape: CallShape,
        scheduler: mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        match shape {
            CallShape::Batch => self.send_batch(group, &scheduler).await,
            CallShape::Plain => {
                for request in group {
                    self.send_plain(request, &scheduler).await;
                }
            }
        }
        let _ = scheduler.send(SchedulerMessage::Finished);
    }

    fn observe(&self, headers: &HeaderMap, scheduler: &mpsc::UnboundedSender<SchedulerMessage>) {
        if let Some(update) = self.policy.observe_headers(headers) {
            let _ = scheduler.send(SchedulerMessage::PacingChanged(update));
        }
    }

    fn requeue_after(
        &self,
        requests: Vec<PendingRequest>,
        delay: Duration,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = scheduler.send(SchedulerMessage::Requeue(requests));
        });
    }

    #[instrument(skip(self, request, scheduler), fields(id = request.id, method = %request.method, url = %request.url))]
    async fn send_plain(
        &self,
        request: PendingRequest,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        let call = TransportRequest {
            method: request.method,
            url: request.url.clone(),
            body: request.body.clone(),
            content_type: request.content_type.clone(),
        };
        let cancel = request.cancel.clone();
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transport.send(call) => Some(result),
        };
        let Some(result) = result else {
            debug!("Request cancelled in flight, transport aborted");
            request.reject_cancelled();
            return;
        };

        match result {
            Ok(response) => {
                self.observe(&response.headers, scheduler);
                if is_success(response.status) {
                    self.policy.record_success();
                    request.respond(Ok(FhirResponse::new(response.status, response.body)));
                    return;
                }
                let failure = Failure {
                    status: response.status,
                    message: diagnostics(&response.body, response.status),
                    www_authenticate: challenge(response.status, &response.headers),
                    headers: Some(&response.headers),
                    elapsed: started.elapsed(),
                };
                self.handle_plain_failure(request, failure, scheduler);
            }
            Err(e) => {
                debug!(error = %e, "Transport aborted");
                let failure = Failure {
                    status: ABORT_STATUS,
                    message: e.message,
                    www_authenticate: None,
                    headers: None,
                    elapsed: started.elapsed(),
                };
                self.handle_plain_failure(request, failure, scheduler);
            }
        }
    }

    fn handle_plain_failure(
        &self,
        mut request: PendingRequest,
        failure: Failure<'_>,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        let attempt = FailedAttempt {
            status: failure.status,
            caller_cancelled: request.is_cancelled(),
            elapsed: failure.elapsed,
            budget: request.retries,
            first_failure: request.mark_failed(),
            headers: failure.headers,
        };

        match self.policy.decide(&attempt) {
            RetryDecision::Retry { delay } => {
                request.retries = request.retries.spend();
                self.requeue_after(vec![request], delay, scheduler);
            }
            RetryDecision::GiveUp if request.is_cancelled() => request.reject_cancelled(),
            RetryDecision::GiveUp => {
                warn!(status = failure.status, message = %failure.message, "Request failed");
                let _ = self.events.send(ClientEvent::SingleRequestFailure {
                    url: request.url.clone(),
                    status: failure.status,
                    message: failure.message.clone(),
                });
                request.respond(Err(RequestError::from_status(
                    failure.status,
                    failure.message,
                    failure.www_authenticate,
                )));
            }
        }
    }

    #[instrument(skip(self, group, scheduler), fields(size = group.len()))]
    async fn send_batch(
        &self,
        group: Vec<PendingRequest>,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        let base = self.server_url.borrow().trim_end_matches('/').to_string();
        let (group, off_base): (Vec<_>, Vec<_>) = group
            .into_iter()
            .partition(|r| relative_url(&base, &r.url) != r.url);
        if !off_base.is_empty() {
            debug!(count = off_base.len(), "Requests queued for another server, sending individually");
            let resend = off_base
                .into_iter()
                .map(|mut request| {
                    request.combinable = false;
                    request
                })
                .collect();
            let _ = scheduler.send(SchedulerMessage::Requeue(resend));
        }
        if group.is_empty() {
            return;
        }
        let bundle = BatchBundle::of_gets(group.iter().map(|r| relative_url(&base, &r.url)));
        let body = match serde_json::to_value(&bundle) {
            Ok(body) => body,
            Err(e) => {
                reject_group(
                    group,
                    RequestError::transport_abort(format!("Failed to encode batch: {}", e)),
                );
                return;
            }
        };
        let call = TransportRequest {
            method: Method::Post,
            url: base,
            body: Some(body),
            content_type: FHIR_JSON.to_string(),
        };

        let tokens: Vec<CancellationToken> = group.iter().map(|r| r.cancel.clone()).collect();
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = join_all(tokens.iter().map(|token| token.cancelled())) => None,
            result = self.transport.send(call) => Some(result),
        };
        let Some(result) = result else {
            debug!("Every batch member cancelled, transport aborted");
            group.into_iter().for_each(PendingRequest::reject_cancelled);
            return;
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Batch transport aborted");
                self.fall_back_to_plain(group, e.message, scheduler);
                return;
            }
        };
        self.observe(&response.headers, scheduler);

        match response.status {
            status if is_success(status) => {
                self.policy.record_success();
                self.split_batch_response(group, response.body, started.elapsed(), scheduler);
            }
            429 => {
                debug!("Batch rate limited, retrying as a whole");
                self.retry_rate_limited(group, Some(&response.headers), started.elapsed(), scheduler);
            }
            status => {
                let message = diagnostics(&response.body, status);
                warn!(status, message = %message, "Batch request failed");
                reject_group(
                    group,
                    RequestError::from_status(status, message, challenge(status, &response.headers)),
                );
            }
        }
    }

    /// The batch POST aborted on its own: resend members one by one.
    fn fall_back_to_plain(
        &self,
        group: Vec<PendingRequest>,
        message: String,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        warn!(size = group.len(), message = %message, "Batch aborted, resending requests individually");
        let _ = self.events.send(ClientEvent::BatchIssue {
            size: group.len(),
            message,
        });

        let mut resend = Vec::with_capacity(group.len());
        for mut request in group {
            if request.is_cancelled() {
                request.reject_cancelled();
            } else {
                request.combinable = false;
                resend.push(request);
            }
        }
        if !resend.is_empty() {
            let _ = scheduler.send(SchedulerMessage::Requeue(resend));
        }
    }

    fn retry_rate_limited(
        &self,
        group: Vec<PendingRequest>,
        headers: Option<&HeaderMap>,
        elapsed: Duration,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        let mut retry = Vec::new();
        let mut retry_delay = Duration::ZERO;
        for mut request in group {
            if request.is_cancelled() {
                request.reject_cancelled();
                continue;
            }
            let attempt = FailedAttempt {
                status: 429,
                caller_cancelled: false,
                elapsed,
                budget: request.retries,
                first_failure: request.mark_failed(),
                headers,
            };
            match self.policy.decide(&attempt) {
                RetryDecision::Retry { delay } => {
                    retry_delay = retry_delay.max(delay);
                    request.retries = request.retries.spend();
                    retry.push(request);
                }
                RetryDecision::GiveUp => request.respond(Err(RequestError::from_status(
                    429,
                    diagnostics(&JsonValue::Null, 429),
                    None,
                ))),
            }
        }
        if !retry.is_empty() {
            self.requeue_after(retry, retry_delay, scheduler);
        }
    }

    /// Settle members from the `batch-response` entries, matched by position.
    fn split_batch_response(
        &self,
        group: Vec<PendingRequest>,
        body: JsonValue,
        elapsed: Duration,
        scheduler: &mpsc::UnboundedSender<SchedulerMessage>,
    ) {
        let bundle: BatchResponseBundle = match serde_json::from_value(body) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(error = %e, "Malformed batch response");
                reject_group(
                    group,
                    RequestError::transport_abort(format!("Malformed batch response: {}", e)),
                );
                return;
            }
        };

        let mut entries = bundle.entry.into_iter();
        let mut rate_limited = Vec::new();
        for request in group {
            let entry = entries.next();
            if request.is_cancelled() {
                request.reject_cancelled();
                continue;
            }
            let Some(entry) = entry else {
                request.respond(Err(RequestError::transport_abort(
                    "Batch response is missing an entry",
                )));
                continue;
            };

            let status = entry.status_code();
            if is_success(status) {
                let data = entry.resource.unwrap_or(JsonValue::Null);
                request.respond(Ok(FhirResponse::new(status, data)));
            } else if status == 429 {
                rate_limited.push(request);
            } else {
                debug!(id = request.id, status, "Batch entry failed");
                request.respond(Err(RequestError::from_status(status, entry.diagnostics(), None)));
            }
        }

        if !rate_limited.is_empty() {
            self.retry_rate_limited(rate_limited, None, elapsed, scheduler);
        }
    }
}
