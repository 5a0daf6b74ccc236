//! Scripted transport recording every call.

use async_trait::async_trait;
use cohort_client::{Transport, TransportRequest, TransportResponse};
use cohort_core::Method;
use cohort_error::HttpError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// What the mock does with one call.
#[derive(Debug, Clone)]
pub struct MockReply {
    status: u16,
    body: Value,
    headers: HeaderMap,
    delay: Duration,
    failure: Option<String>,
}

impl MockReply {
    /// Respond with `status` and a JSON body.
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
            delay: Duration::ZERO,
            failure: None,
        }
    }

    /// Fail without an HTTP status, like a reset connection.
    #[allow(dead_code)]
    pub fn fail(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::json(0, Value::Null)
        }
    }

    /// Add a response header.
    #[allow(dead_code)]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).expect("valid header value"),
        );
        self
    }

    /// Answer only after `delay`.
    #[allow(dead_code)]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A call the mock received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: TransportRequest,
    pub at: Instant,
}

type Script = dyn Fn(&TransportRequest, usize) -> MockReply + Send + Sync;

/// Transport answering from a script.
///
/// The script receives the request and the zero-based call index.
pub struct MockTransport {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedCall>>,
    completed: AtomicUsize,
    aborted: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Mock answering with `script`.
    pub fn new(
        script: impl Fn(&TransportRequest, usize) -> MockReply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            aborted: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Mock echoing every request with 200.
    #[allow(dead_code)]
    pub fn echoing() -> Arc<Self> {
        Self::new(|request, _| echo(request))
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls that ran to completion.
    #[allow(dead_code)]
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Calls dropped before they completed.
    #[allow(dead_code)]
    pub fn aborted_count(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// Counts the call as aborted unless it finished.
struct AbortGuard {
    aborted: Arc<AtomicUsize>,
    finished: bool,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let url = request.url.clone();
        let reply = {
            let mut calls = self.calls.lock().unwrap();
            let reply = (self.script)(&request, calls.len());
            calls.push(RecordedCall {
                request,
                at: Instant::now(),
            });
            reply
        };

        let mut guard = AbortGuard {
            aborted: Arc::clone(&self.aborted),
            finished: false,
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        guard.finished = true;
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply.failure {
            Some(message) => Err(HttpError::new(message).with_url(url)),
            None => Ok(TransportResponse {
                status: reply.status,
                headers: reply.headers,
                body: reply.body,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Relative URLs of the entries of a batch request.
#[allow(dead_code)]
pub fn batch_entries(request: &TransportRequest) -> Vec<String> {
    request
        .body
        .as_ref()
        .and_then(|body| body.get("entry"))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry["request"]["url"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// 200 echo: plain requests get `{"url": ...}`, batches get one entry per member.
pub fn echo(request: &TransportRequest) -> MockReply {
    let is_batch = request.method == Method::Post
        && request.body.as_ref().is_some_and(|b| b["type"] == "batch");
    if !is_batch {
        return MockReply::json(200, json!({ "url": request.url, "body": request.body }));
    }
    let entries: Vec<Value> = batch_entries(request)
        .into_iter()
        .map(|url| json!({ "resource": { "url": url }, "response": { "status": "200 OK" } }))
        .collect();
    MockReply::json(
        200,
        json!({ "resourceType": "Bundle", "type": "batch-response", "entry": entries }),
    )
}
