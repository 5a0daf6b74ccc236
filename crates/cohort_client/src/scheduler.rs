//! The scheduler actor.
//!
//! One task owns the pending queue, the active-call count, the pacing clock
//! and the tunables. Callers, transport tasks and retry timers talk to it
//! over a channel, so every dispatch decision sees the concurrency cap and
//! the pacing interval atomically.

use crate::dispatch::{CallShape, Dispatcher};
use crate::pending::{PendingQueue, PendingRequest};
use cohort_core::{ClientConfig, ClientEvent};
use cohort_error::RequestError;
use cohort_rate_limit::PacingUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument};

/// Snapshot of the scheduler's adjustable parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// Maximum number of GETs per batch bundle
    pub max_requests_per_batch: usize,
    /// Maximum number of network calls in flight
    pub max_active_requests: usize,
    /// Whether GETs may be merged into batch bundles
    pub batching_enabled: bool,
    /// Pacing set by the caller, replacing the detected one
    pub pacing_override: Option<Duration>,
    /// Pacing currently enforced between dispatches
    pub pacing_interval: Duration,
}

impl Tunables {
    pub(crate) fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_requests_per_batch: *config.max_requests_per_batch(),
            max_active_requests: *config.max_active_requests(),
            batching_enabled: true,
            pacing_override: None,
            pacing_interval: Duration::ZERO,
        }
    }
}

/// A change requested through the client's setters.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Tune {
    MaxRequestsPerBatch(usize),
    MaxActiveRequests(usize),
    PacingOverride(Option<Duration>),
    Batching(bool),
}

#[derive(Debug)]
pub(crate) enum SchedulerMessage {
    Enqueue(PendingRequest),
    /// Retried requests, placed back at the head
    Requeue(Vec<PendingRequest>),
    /// A transport task released its slot
    Finished,
    PacingChanged(PacingUpdate),
    Tune(Tune),
    Shutdown,
}

pub(crate) struct Scheduler {
    rx: mpsc::UnboundedReceiver<SchedulerMessage>,
    tx: mpsc::UnboundedSender<SchedulerMessage>,
    queue: PendingQueue,
    active: usize,
    last_dispatch: Option<Instant>,
    debounce_until: Option<Instant>,
    batch_timeout: Duration,
    max_url_length: usize,
    tunables: Tunables,
    published: watch::Sender<Tunables>,
    events: broadcast::Sender<ClientEvent>,
    dispatcher: Arc<Dispatcher>,
}

impl Scheduler {
    pub(crate) fn new(
        config: &ClientConfig,
        rx: mpsc::UnboundedReceiver<SchedulerMessage>,
        tx: mpsc::UnboundedSender<SchedulerMessage>,
        published: watch::Sender<Tunables>,
        events: broadcast::Sender<ClientEvent>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            rx,
            tx,
            queue: PendingQueue::default(),
            active: 0,
            last_dispatch: None,
            debounce_until: None,
            batch_timeout: config.batch_timeout(),
            max_url_length: *config.max_url_length(),
            tunables: Tunables::from_config(config),
            published,
            events,
            dispatcher,
        }
    }

    /// Process messages until shutdown, then reject whatever is still queued.
    #[instrument(skip(self), name = "scheduler")]
    pub(crate) async fn run(mut self) {
        info!("Request scheduler started");

        loop {
            let wakeup = self.next_wakeup();
            let deadline = wakeup.unwrap_or_else(Instant::now);
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(SchedulerMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message),
                },
                () = sleep_until(deadline), if wakeup.is_some() => {}
            }
            self.dispatch_ready();
        }

        self.queue
            .drain_with(RequestError::transport_abort("request client shut down"));
        info!("Request scheduler stopped");
    }

    fn handle(&mut self, message: SchedulerMessage) {
        match message {
            SchedulerMessage::Enqueue(request) => {
                debug!(id = request.id, priority = ?request.priority, "Request queued");
                self.queue.insert(request);
                self.debounce_until = if self.queue.live_len() < self.tunables.max_requests_per_batch {
                    Some(Instant::now() + self.batch_timeout)
                } else {
                    None
                };
            }
            SchedulerMessage::Requeue(requests) => {
                debug!(count = requests.len(), "Requests requeued at head");
                self.queue.push_front_all(requests);
            }
            SchedulerMessage::Finished => {
                self.active = self.active.saturating_sub(1);
            }
            SchedulerMessage::PacingChanged(update) => self.apply_pacing(update),
            SchedulerMessage::Tune(tune) => self.apply_tune(tune),
            SchedulerMessage::Shutdown => {}
        }
    }

    fn apply_pacing(&mut self, update: PacingUpdate) {
        if update.newly_enabled {
            self.tunables.max_active_requests = 1;
        }
        self.publish();
        if update.newly_enabled {
            info!(
                pacing_ms = update.interval.as_millis() as u64,
                "Rate limit detected, limiting to one active request"
            );
            let _ = self.events.send(ClientEvent::ParametersChanged {
                max_active_requests: self.tunables.max_active_requests,
                max_requests_per_batch: self.tunables.max_requests_per_batch,
                pacing_interval_ms: self.tunables.pacing_interval.as_millis() as u64,
            });
        }
    }

    fn apply_tune(&mut self, tune: Tune) {
        match tune {
            Tune::MaxRequestsPerBatch(value) => self.tunables.max_requests_per_batch = value.max(1),
            Tune::MaxActiveRequests(value) => self.tunables.max_active_requests = value.max(1),
            Tune::PacingOverride(value) => self.tunables.pacing_override = value,
            Tune::Batching(enabled) => self.tunables.batching_enabled = enabled,
        }
        debug!(?tune, "Tunables changed");
        self.publish();
    }

    fn publish(&mut self) {
        self.tunables.pacing_interval = self.pacing();
        self.published.send_replace(self.tunables.clone());
    }

    fn pacing(&self) -> Duration {
        self.tunables
            .pacing_override
            .unwrap_or_else(|| self.dispatcher.policy().pacing_interval())
    }

    /// Earliest instant at which the pacing interval allows another dispatch.
    fn next_pacing_slot(&self) -> Option<Instant> {
        let pacing = self.pacing();
        if pacing.is_zero() {
            return None;
        }
        self.last_dispatch.map(|last| last + pacing)
    }

    fn next_wakeup(&self) -> Option<Instant> {
        if self.debounce_until.is_some() {
            return self.debounce_until;
        }
        if self.queue.is_empty() || self.active >= self.tunables.max_active_requests {
            return None;
        }
        self.next_pacing_slot()
    }

    fn shape_of(&self, group: &[PendingRequest]) -> CallShape {
        let long_get = group.first().is_some_and(|request| {
            self.tunables.batching_enabled
                && request.is_combinable()
                && request.url.len() > self.max_url_length
        });
        if group.len() > 1 || long_get {
            CallShape::Batch
        } else {
            CallShape::Plain
        }
    }

    /// Dispatch groups while a slot is free and pacing allows.
    fn dispatch_ready(&mut self) {
        let now = Instant::now();
        if let Some(until) = self.debounce_until {
            if now < until {
                return;
            }
            self.debounce_until = None;
        }

        while self.active < self.tunables.max_active_requests && !self.queue.is_empty() {
            if self.next_pacing_slot().is_some_and(|slot| now < slot) {
                return;
            }
            let group = self.queue.select_next_group(
                self.tunables.max_requests_per_batch,
                self.tunables.batching_enabled,
            );
            if group.is_empty() {
                break;
            }

            let shape = self.shape_of(&group);
            self.active += 1;
            self.last_dispatch = Some(now);
            debug!(
                size = group.len(),
                ?shape,
                active = self.active,
                queued = self.queue.len(),
                "Dispatching"
            );
            tokio::spawn(
                Arc::clone(&self.dispatcher).run(group, shape, self.tx.clone()),
            );
        }
    }
}
