//! A routing FHIR server behind the transport seam.

use async_trait::async_trait;
use cohort_client::{Transport, TransportRequest, TransportResponse};
use cohort_core::Method;
use cohort_error::HttpError;
use reqwest::header::{HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// Response to one routed path.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
    pub www_authenticate: Option<String>,
    pub delay: Duration,
}

impl Reply {
    /// 200 with `body`.
    pub fn ok(body: Value) -> Self {
        Self::status(200, body)
    }

    /// Any status with `body`.
    pub fn status(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            www_authenticate: None,
            delay: Duration::ZERO,
        }
    }

    /// 400 with an OperationOutcome carrying `diagnostics`.
    #[allow(dead_code)]
    pub fn bad_request(diagnostics: &str) -> Self {
        Self::status(
            400,
            json!({
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "error", "code": "invalid", "diagnostics": diagnostics}]
            }),
        )
    }

    /// 401 challenging with `challenge`.
    #[allow(dead_code)]
    pub fn unauthorized(challenge: &str) -> Self {
        Self {
            www_authenticate: Some(challenge.to_string()),
            ..Self::status(401, Value::Null)
        }
    }

    /// Answer only after `delay`.
    #[allow(dead_code)]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Searchset bundle reporting `total` matches.
pub fn searchset(total: u64) -> Value {
    json!({ "resourceType": "Bundle", "type": "searchset", "total": total, "entry": [] })
}

/// Router of a server supporting everything, reporting `fhir_version`.
///
/// Patients number 10, of which 3 lack a birth date.
pub fn capable_server(fhir_version: &'static str) -> impl Fn(&str, &str) -> Reply + Send + Sync {
    move |server: &str, path: &str| {
        if path.starts_with("metadata") {
            return Reply::ok(json!({
                "resourceType": "CapabilityStatement",
                "fhirVersion": fhir_version,
                "software": { "name": format!("Server at {}", server) }
            }));
        }
        match path {
            "Patient?_summary=count" => Reply::ok(searchset(10)),
            "Patient?birthdate:missing=true&_summary=count" => Reply::ok(searchset(3)),
            "Patient?birthdate:missing=false&_summary=count" => Reply::ok(searchset(7)),
            _ => Reply::ok(searchset(1)),
        }
    }
}

type Router = dyn Fn(&str, &str) -> Reply + Send + Sync;

/// A request as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub server: String,
    pub method: Method,
    /// Path relative to the server; empty for a batch POST
    pub path: String,
    /// Entry paths of a batch POST
    pub entries: Vec<String>,
}

/// Transport answering for several servers under `https://<host>/fhir`.
pub struct FhirServerMock {
    router: Box<Router>,
    without_batch: HashSet<String>,
    seen: Mutex<Vec<Seen>>,
}

impl FhirServerMock {
    /// Server routing every request through `router(server, path)`.
    pub fn new(router: impl Fn(&str, &str) -> Reply + Send + Sync + 'static) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            router: Box::new(router),
            without_batch: HashSet::new(),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Server rejecting batch bundles at `servers`.
    #[allow(dead_code)]
    pub fn without_batch(
        router: impl Fn(&str, &str) -> Reply + Send + Sync + 'static,
        servers: &[&str],
    ) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            router: Box::new(router),
            without_batch: servers.iter().map(|s| s.to_string()).collect(),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Requests received so far.
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Every path requested from `server`, batch entries included.
    #[allow(dead_code)]
    pub fn paths(&self, server: &str) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter(|seen| seen.server == server)
            .flat_map(|seen| {
                if seen.entries.is_empty() {
                    vec![seen.path]
                } else {
                    seen.entries
                }
            })
            .collect()
    }

    /// Metadata requests sent to `server`.
    #[allow(dead_code)]
    pub fn metadata_calls(&self, server: &str) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter(|seen| seen.server == server && seen.path.starts_with("metadata"))
            .map(|seen| seen.path)
            .collect()
    }

    fn batch(&self, server: &str, body: &Value) -> Reply {
        if self.without_batch.contains(server) {
            return Reply::bad_request("Batch bundles are not supported");
        }
        let entries: Vec<Value> = entry_paths(body)
            .iter()
            .map(|path| {
                let reply = (self.router)(server, path);
                json!({
                    "resource": reply.body,
                    "response": { "status": reply.status.to_string() }
                })
            })
            .collect();
        Reply::ok(json!({ "resourceType": "Bundle", "type": "batch-response", "entry": entries }))
    }
}

fn entry_paths(body: &Value) -> Vec<String> {
    body.get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry["request"]["url"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Split `https://host/fhir/path` into the server base and the path.
fn split(url: &str) -> (String, String) {
    match url.find("/fhir") {
        Some(index) => {
            let (server, rest) = url.split_at(index + "/fhir".len());
            (server.to_string(), rest.trim_start_matches('/').to_string())
        }
        None => (url.to_string(), String::new()),
    }
}

#[async_trait]
impl Transport for FhirServerMock {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let (server, path) = split(&request.url);
        let batch_body = request
            .body
            .as_ref()
            .filter(|body| request.method == Method::Post && body["type"] == "batch");

        let reply = match batch_body {
            Some(body) => {
                self.seen.lock().unwrap().push(Seen {
                    server: server.clone(),
                    method: request.method,
                    path: path.clone(),
                    entries: entry_paths(body),
                });
                self.batch(&server, body)
            }
            None => {
                self.seen.lock().unwrap().push(Seen {
                    server: server.clone(),
                    method: request.method,
                    path: path.clone(),
                    entries: Vec::new(),
                });
                (self.router)(&server, &path)
            }
        };

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        let mut headers = HeaderMap::new();
        if let Some(challenge) = &reply.www_authenticate {
            headers.insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_str(challenge).expect("valid challenge"),
            );
        }
        Ok(TransportResponse {
            status: reply.status,
            headers,
            body: reply.body,
        })
    }

    fn name(&self) -> &'static str {
        "fhir-server-mock"
    }
}
