//! The network seam under the scheduler.
//!
//! The scheduler decides *what* to send; a [`Transport`] performs exactly one
//! HTTP exchange. Keeping the seam narrow lets tests script server behaviour
//! without a socket.

use async_trait::async_trait;
use cohort_core::{ClientConfig, FHIR_JSON, Method};
use cohort_error::HttpError;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, instrument};

/// One physical HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// JSON body for POST and PUT
    pub body: Option<JsonValue>,
    /// Content type of `body`
    pub content_type: String,
}

/// Raw result of a physical HTTP call, whatever its status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed JSON body; `Null` when empty, a string when not JSON
    pub body: JsonValue,
}

/// Performs HTTP exchanges for the scheduler.
///
/// Returning `Err` means no HTTP status was obtained (connection failure,
/// timeout, reset). Dropping the returned future aborts the call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        "transport"
    }
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the configured timeout and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(*config.request_timeout_secs()))
            .user_agent(config.user_agent().as_str())
            .build()
            .map_err(|e| HttpError::new(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), &request.url)
            .header(ACCEPT, FHIR_JSON);
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, request.content_type.as_str())
                .json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::new(format!("Request failed: {}", e)).with_url(&request.url))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| {
                HttpError::new(format!("Failed to read response body: {}", e)).with_url(&request.url)
            })?;

        let body = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        debug!(status, "Response received");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
