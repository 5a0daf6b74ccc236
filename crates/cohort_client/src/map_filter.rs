//! Paged map-filter over search results.

use crate::client::FhirClient;
use crate::url::append_query;
use cohort_core::{CacheOptions, CancellationToken, RequestOptions};
use cohort_error::RequestError;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// What the mapper decided for one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    /// Keep the resource as is
    Keep,
    /// Leave it out
    Drop,
    /// Keep this value in its place
    Replace(JsonValue),
}

impl From<bool> for MapOutcome {
    fn from(keep: bool) -> Self {
        if keep { MapOutcome::Keep } else { MapOutcome::Drop }
    }
}

/// Collected items and the search-set size.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFilterResult {
    /// Kept items in page order, at most the target count
    pub items: Vec<JsonValue>,
    /// Total reported by the first page, else the kept count once the
    /// pages ran out, else unknown
    pub total: Option<u64>,
}

/// A running map-filter.
#[derive(Debug)]
pub struct MapFilterHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<MapFilterResult, RequestError>>,
}

impl MapFilterHandle {
    /// Stop the walk: pending mapper calls and page fetches reject as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token cancelling the walk.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the outcome.
    pub async fn result(self) -> Result<MapFilterResult, RequestError> {
        self.task
            .await
            .unwrap_or_else(|e| Err(RequestError::transport_abort(format!("map-filter task failed: {}", e))))
    }
}

/// Walks `next` links applying an async mapper until enough items are kept.
#[derive(Debug, Clone)]
pub struct PagedMapFilter {
    client: FhirClient,
    page_size: usize,
}

impl PagedMapFilter {
    /// Map-filter fetching pages of `page_size` through `client`.
    pub fn new(client: FhirClient, page_size: usize) -> Self {
        Self { client, page_size }
    }

    /// Start walking from `url`.
    ///
    /// Pages are fetched through the in-memory response cache. The mapper
    /// runs concurrently over the resources of a page; kept items keep page
    /// order.
    pub fn run<F, Fut>(&self, url: &str, target: usize, mapper: F) -> MapFilterHandle
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MapOutcome> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let first_page = append_query(url, "_count", &self.page_size.to_string());
        let walk = Walk {
            client: self.client.clone(),
            cancel: cancel.clone(),
            mapper: Arc::new(mapper),
        };
        let task = tokio::spawn(walk.collect(first_page, target));
        MapFilterHandle { cancel, task }
    }
}

struct Walk<F> {
    client: FhirClient,
    cancel: CancellationToken,
    mapper: Arc<F>,
}

impl<F, Fut> Walk<F>
where
    F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MapOutcome> + Send + 'static,
{
    #[instrument(skip(self))]
    async fn collect(
        self,
        first_page: String,
        target: usize,
    ) -> Result<MapFilterResult, RequestError> {
        let options = CacheOptions::default()
            .with_request(RequestOptions::default().with_cancel(self.cancel.clone()));
        let mut items = Vec::new();
        let mut total = None;
        let mut next = Some(first_page);
        let mut first = true;

        while let Some(url) = next.take() {
            if self.cancel.is_cancelled() {
                return Err(RequestError::cancelled());
            }
            let page = self.client.get_with_cache(&url, &options).await?;
            if first {
                total = page.total();
                first = false;
            }

            let resources: Vec<JsonValue> = page
                .entries()
                .iter()
                .map(|entry| entry.get("resource").cloned().unwrap_or_else(|| entry.clone()))
                .collect();
            let outcomes = join_all(resources.into_iter().map(|resource| self.apply(resource))).await;
            for outcome in outcomes {
                match outcome? {
                    (resource, MapOutcome::Keep) => items.push(resource),
                    (_, MapOutcome::Replace(value)) => items.push(value),
                    (_, MapOutcome::Drop) => {}
                }
            }
            debug!(kept = items.len(), target, "Page processed");

            match page.next_link() {
                None => {
                    total = total.or(Some(items.len() as u64));
                }
                Some(_) if items.len() >= target => {}
                Some(link) => next = Some(link.to_string()),
            }
        }

        items.truncate(target);
        Ok(MapFilterResult { items, total })
    }

    async fn apply(&self, resource: JsonValue) -> Result<(JsonValue, MapOutcome), RequestError> {
        let mapped = (self.mapper)(resource.clone());
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RequestError::cancelled()),
            outcome = mapped => Ok((resource, outcome)),
        }
    }
}
