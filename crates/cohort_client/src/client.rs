//! The request client collaborators talk to.

use crate::dispatch::Dispatcher;
use crate::map_filter::{MapFilterHandle, MapOutcome, PagedMapFilter};
use crate::pending::PendingRequest;
use crate::scheduler::{Scheduler, SchedulerMessage, Tune, Tunables};
use crate::transport::{ReqwestTransport, Transport};
use crate::url::resolve_url;
use cohort_cache::{AddOptions, CachedResponse, ResponseCache};
use cohort_core::{
    CacheConfig, CacheOptions, ClientEvent, CohortConfig, FhirResponse, Method, RequestOptions,
    operation_outcome_diagnostics,
};
use cohort_error::{CohortResult, RequestError};
use cohort_rate_limit::RetryPolicy;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, instrument};

/// Capacity of the observability event channel.
const EVENT_CAPACITY: usize = 64;

struct ClientInner {
    scheduler: mpsc::UnboundedSender<SchedulerMessage>,
    tunables: watch::Receiver<Tunables>,
    server_url: watch::Sender<String>,
    events: broadcast::Sender<ClientEvent>,
    cache: ResponseCache,
    cache_config: CacheConfig,
    policy: Arc<RetryPolicy>,
    next_id: AtomicU64,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.scheduler.send(SchedulerMessage::Shutdown);
    }
}

/// Batched, cached, rate-adaptive FHIR client.
///
/// Cloning is cheap; clones share one scheduler, cache and retry policy.
/// Dropping the last clone stops the scheduler and rejects queued requests.
///
/// # Example
///
/// ```no_run
/// use cohort_client::FhirClient;
/// use cohort_core::{CohortConfig, RequestOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FhirClient::from_config("https://hapi.fhir.org/baseR4", &CohortConfig::default())?;
/// let response = client.get("Patient?_count=1", &RequestOptions::default()).await?;
/// println!("{}", response.data);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FhirClient {
    inner: Arc<ClientInner>,
}

impl FhirClient {
    /// Create a client over an explicit transport and cache.
    ///
    /// Must be called inside a Tokio runtime; the scheduler runs as a task.
    #[instrument(skip_all, fields(server_url = %server_url.as_ref(), transport = transport.name()))]
    pub fn new(
        server_url: impl AsRef<str>,
        config: &CohortConfig,
        transport: Arc<dyn Transport>,
        cache: ResponseCache,
    ) -> CohortResult<Self> {
        config.client().validate()?;

        let (server_tx, server_rx) = watch::channel(server_url.as_ref().to_string());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let policy = Arc::new(RetryPolicy::new(config.retry().clone()));
        let (tunables_tx, tunables_rx) = watch::channel(Tunables::from_config(config.client()));
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            Arc::clone(&policy),
            events.clone(),
            server_rx,
        ));
        let scheduler = Scheduler::new(
            config.client(),
            rx,
            tx.clone(),
            tunables_tx,
            events.clone(),
            dispatcher,
        );
        tokio::spawn(scheduler.run());
        info!(cache = cache.backend_name(), "Request client created");

        Ok(Self {
            inner: Arc::new(ClientInner {
                scheduler: tx,
                tunables: tunables_rx,
                server_url: server_tx,
                events,
                cache,
                cache_config: config.cache().clone(),
                policy,
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Create a client with the `reqwest` transport and the configured cache.
    pub fn from_config(server_url: impl AsRef<str>, config: &CohortConfig) -> CohortResult<Self> {
        let transport = ReqwestTransport::new(config.client())?;
        let cache = ResponseCache::from_config(config.cache());
        Self::new(server_url, config, Arc::new(transport), cache)
    }

    /// Base URL relative requests resolve against.
    pub fn server_url(&self) -> String {
        self.inner.server_url.borrow().clone()
    }

    /// Point the client at another server.
    ///
    /// Queued requests keep their absolute URLs; callers switching servers
    /// cancel their own work.
    pub fn set_server_url(&self, server_url: impl Into<String>) {
        let server_url = server_url.into();
        info!(server_url = %server_url, "Server URL changed");
        self.inner.server_url.send_replace(server_url);
    }

    /// Absolute form of `url` against the current server.
    pub fn resolve(&self, url: &str) -> String {
        resolve_url(&self.inner.server_url.borrow(), url)
    }

    /// Shared retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// GET `url` through the scheduler.
    pub async fn get(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<FhirResponse, RequestError> {
        self.request(Method::Get, url, None, options).await
    }

    /// Send any request through the scheduler. Only GETs are ever batched.
    #[instrument(skip(self, body, options), fields(priority = ?options.priority()))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<JsonValue>,
        options: &RequestOptions,
    ) -> Result<FhirResponse, RequestError> {
        let cancel = options.cancel().clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(RequestError::cancelled());
        }

        let (responder, outcome) = oneshot::channel();
        let pending = PendingRequest::new(
            self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            self.resolve(url),
            body,
            options.content_type().clone(),
            *options.combinable() && method == Method::Get,
            cancel.clone(),
            options
                .retries()
                .unwrap_or_else(|| self.inner.policy.default_budget()),
            *options.priority(),
            responder,
        );
        self.inner
            .scheduler
            .send(SchedulerMessage::Enqueue(pending))
            .map_err(|_| RequestError::transport_abort("request scheduler has shut down"))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::cancelled()),
            outcome = outcome => outcome.unwrap_or_else(|_| {
                Err(RequestError::transport_abort("request scheduler has shut down"))
            }),
        }
    }

    /// GET through the response cache.
    ///
    /// A live entry is returned without a network call; a cached error
    /// status is returned as a rejection. On a miss the response is stored,
    /// and so is an HTTP error when `cache_errors` is set.
    #[instrument(skip(self, options), fields(cache_name = ?options.cache_name()))]
    pub async fn get_with_cache(
        &self,
        url: &str,
        options: &CacheOptions,
    ) -> Result<FhirResponse, RequestError> {
        let key = self.resolve(url);
        let cache_name = options.cache_name().as_deref();

        if let Some(entry) = self.inner.cache.get(&key, cache_name).await {
            let cached = entry.into_payload();
            if cached.is_success() {
                return Ok(FhirResponse::new(*cached.status(), cached.data().clone()));
            }
            let message = operation_outcome_diagnostics(cached.data());
            return Err(RequestError::from_status(*cached.status(), message, None));
        }

        let outcome = self.get(&key, options.request()).await;
        let add = AddOptions {
            cache_name,
            expiration_seconds: options
                .expiration_seconds()
                .or(*self.inner.cache_config.default_expiration_seconds()),
            cache_errors: *options.cache_errors(),
        };
        match &outcome {
            Ok(response) => {
                let cached = CachedResponse::new(response.status, response.data.clone());
                self.inner.cache.add(&key, cached, &add).await;
            }
            Err(e) if !e.is_abort() => {
                let cached = CachedResponse::new(e.status, JsonValue::String(e.message.clone()));
                self.inner.cache.add(&key, cached, &add).await;
            }
            Err(_) => {}
        }
        outcome
    }

    /// Walk result pages from `url`, keeping what `mapper` keeps, until
    /// `target` items are collected or the pages run out.
    pub fn resources_map_filter<F, Fut>(
        &self,
        url: &str,
        target: usize,
        mapper: F,
        page_size: usize,
    ) -> MapFilterHandle
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MapOutcome> + Send + 'static,
    {
        PagedMapFilter::new(self.clone(), page_size).run(url, target, mapper)
    }

    /// Current tunables.
    pub fn tunables(&self) -> Tunables {
        self.inner.tunables.borrow().clone()
    }

    fn tune(&self, tune: Tune) {
        let _ = self.inner.scheduler.send(SchedulerMessage::Tune(tune));
    }

    /// Set the batch size cap (at least 1).
    pub fn set_max_requests_per_batch(&self, value: usize) {
        self.tune(Tune::MaxRequestsPerBatch(value));
    }

    /// Set the concurrency cap (at least 1).
    pub fn set_max_active_requests(&self, value: usize) {
        self.tune(Tune::MaxActiveRequests(value));
    }

    /// Replace the detected pacing; `None` returns to the detected value.
    pub fn set_pacing_override(&self, pacing: Option<Duration>) {
        self.tune(Tune::PacingOverride(pacing));
    }

    /// Allow or forbid batch bundles.
    pub fn set_batching_enabled(&self, enabled: bool) {
        debug!(enabled, "Batching toggled");
        self.tune(Tune::Batching(enabled));
    }

    /// Subscribe to observability events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Drop one named cache.
    pub async fn clear_cache(&self, cache_name: &str) -> CohortResult<()> {
        self.inner.cache.clear_by_name(cache_name).await
    }

    /// Drop every cached response.
    pub async fn clear_all_caches(&self) -> CohortResult<()> {
        self.inner.cache.clear_all().await
    }
}

impl std::fmt::Debug for FhirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirClient")
            .field("server_url", &*self.inner.server_url.borrow())
            .field("cache", &self.inner.cache)
            .finish()
    }
}
