//! The capability negotiation state machine.
//!
//! CheckMetadata -> ProbeCore -> ProbeConditional -> Complete, once per
//! (server URL, context). Every step re-checks that its run is still the
//! live one before its result is used.

use crate::context::NegotiationContext;
use crate::probes::Prober;
use crate::version::version_name;
use cohort_client::FhirClient;
use cohort_core::{
    CancellationToken, FeatureValue, RequestOptions, ServerFeatures, features::names,
};
use cohort_error::{NegotiationError, NegotiationErrorKind, RequestError};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

type NegotiationOutcome = Result<ServerFeatures, NegotiationError>;

/// Parameters of the metadata request that some servers reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataParam {
    /// Ask only for the fields negotiation reads
    Elements,
    /// Force JSON for servers ignoring `Accept`
    Format,
}

impl MetadataParam {
    fn name(self) -> &'static str {
        match self {
            MetadataParam::Elements => "_elements",
            MetadataParam::Format => "_format",
        }
    }

    fn query(self) -> &'static str {
        match self {
            MetadataParam::Elements => "_elements=fhirVersion,software",
            MetadataParam::Format => "_format=json",
        }
    }
}

fn metadata_url(params: &[MetadataParam]) -> String {
    if params.is_empty() {
        return "metadata".to_string();
    }
    let query: Vec<&str> = params.iter().map(|param| param.query()).collect();
    format!("metadata?{}", query.join("&"))
}

/// The parameter a 400 response names as unsupported.
fn rejected_param(error: &RequestError, params: &[MetadataParam]) -> Option<MetadataParam> {
    if error.status != 400 {
        return None;
    }
    params
        .iter()
        .copied()
        .find(|param| error.message.contains(param.name()))
}

/// Map a failed metadata request to its terminal outcome.
fn metadata_failure(error: RequestError) -> NegotiationError {
    if error.status == 401 {
        let scheme = error
            .www_authenticate
            .as_deref()
            .and_then(|challenge| challenge.split_whitespace().next())
            .map(str::to_ascii_lowercase);
        match scheme.as_deref() {
            Some("basic") => return NegotiationError::new(NegotiationErrorKind::BasicAuthRequired),
            Some("bearer") => return NegotiationError::new(NegotiationErrorKind::OAuth2Required),
            _ => {}
        }
    }
    NegotiationError::from(error)
}

/// What the capability statement told us.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Metadata {
    fhir_version: String,
    version_name: &'static str,
    software_name: Option<String>,
}

impl Metadata {
    fn parse(statement: &JsonValue) -> Result<Self, NegotiationError> {
        let fhir_version = statement
            .get("fhirVersion")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(version_name) = version_name(&fhir_version) else {
            return Err(NegotiationError::new(NegotiationErrorKind::UnsupportedVersion(
                fhir_version,
            )));
        };
        let software_name = statement
            .pointer("/software/name")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        Ok(Self {
            fhir_version,
            version_name,
            software_name,
        })
    }

    fn features(&self) -> Vec<(String, FeatureValue)> {
        let mut features = vec![
            (names::VERSION_NAME.to_string(), self.version_name.into()),
            (names::FHIR_VERSION.to_string(), self.fhir_version.clone().into()),
        ];
        if let Some(software) = &self.software_name {
            features.push((names::SOFTWARE_NAME.to_string(), software.clone().into()));
        }
        features
    }
}

/// One negotiation run.
struct Negotiation {
    client: FhirClient,
    server_url: String,
    context: NegotiationContext,
    cancel: CancellationToken,
    published: Arc<RwLock<Option<ServerFeatures>>>,
}

impl Negotiation {
    /// Fail with `Outdated` once a newer run or server has taken over.
    fn guard(&self) -> Result<(), NegotiationError> {
        if self.cancel.is_cancelled() || self.client.server_url() != self.server_url {
            debug!("Negotiation superseded");
            return Err(NegotiationError::new(NegotiationErrorKind::Outdated));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(server_url = %self.server_url, context = %self.context))]
    async fn run(self) -> NegotiationOutcome {
        info!("Starting capability negotiation");

        let metadata = self.check_metadata().await?;
        debug!(version = metadata.version_name, "Metadata checked");

        let prober = Prober::new(&self.client, &self.server_url, self.cancel.clone());
        let core = prober.probe_core().await;
        self.guard()?;

        let conditional = match self.context {
            NegotiationContext::Restricted => Vec::new(),
            NegotiationContext::Full => prober.probe_full(&core).await,
        };
        self.guard()?;

        let features: ServerFeatures = metadata
            .features()
            .into_iter()
            .chain(core.features())
            .chain(conditional)
            .collect();

        let mut published = self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.guard()?;
        self.client.set_batching_enabled(core.has_batch_support);
        *published = Some(features.clone());
        info!(
            version = metadata.version_name,
            batch = core.has_batch_support,
            features = features.len(),
            "Capability negotiation complete"
        );
        Ok(features)
    }

    /// GET `metadata`, dropping a parameter the server rejects.
    ///
    /// Each fallback removes one parameter, so there are at most three attempts.
    async fn check_metadata(&self) -> Result<Metadata, NegotiationError> {
        let options = RequestOptions::default()
            .with_combinable(false)
            .with_cancel(self.cancel.clone());
        let mut params = vec![MetadataParam::Elements, MetadataParam::Format];

        loop {
            let outcome = self.client.get(&metadata_url(&params), &options).await;
            self.guard()?;
            match outcome {
                Ok(response) => return Metadata::parse(&response.data),
                Err(e) => match rejected_param(&e, &params) {
                    Some(param) => {
                        warn!(param = param.name(), "Server rejected metadata parameter, retrying without it");
                        params.retain(|p| *p != param);
                    }
                    None => return Err(metadata_failure(e)),
                },
            }
        }
    }
}

struct Run {
    server_url: String,
    context: NegotiationContext,
    cancel: CancellationToken,
    outcome: Shared<BoxFuture<'static, NegotiationOutcome>>,
}

/// Learns what a server supports, once per server URL and context.
///
/// Concurrent callers for the same server and context share one run. A run
/// that failed is forgotten, so the next call starts over.
/// Asking for another server or context cancels the previous run's requests;
/// that run then fails with an outdated-negotiation error instead of
/// publishing features.
///
/// # Example
///
/// ```no_run
/// use cohort_capability::{CapabilityNegotiator, NegotiationContext};
/// use cohort_client::FhirClient;
/// use cohort_core::CohortConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FhirClient::from_config("https://hapi.fhir.org/baseR4", &CohortConfig::default())?;
/// let negotiator = CapabilityNegotiator::new(client);
/// let features = negotiator
///     .initialize("https://hapi.fhir.org/baseR4", NegotiationContext::Full)
///     .await?;
/// println!("{:?}", features.version_name());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CapabilityNegotiator {
    client: FhirClient,
    current: Arc<Mutex<Option<Run>>>,
    published: Arc<RwLock<Option<ServerFeatures>>>,
}

impl CapabilityNegotiator {
    /// Negotiator issuing its probes through `client`.
    pub fn new(client: FhirClient) -> Self {
        Self {
            client,
            current: Arc::new(Mutex::new(None)),
            published: Arc::new(RwLock::new(None)),
        }
    }

    /// Client the probes go through.
    pub fn client(&self) -> &FhirClient {
        &self.client
    }

    /// Negotiate with `server_url`, or join the run already under way.
    ///
    /// Points the client at `server_url` when a new run starts.
    ///
    /// # Errors
    ///
    /// `UnsupportedVersion`, `BasicAuthRequired` and `OAuth2Required` from
    /// the metadata check, the metadata request's own rejection, or
    /// `Outdated` when superseded.
    pub async fn initialize(
        &self,
        server_url: impl Into<String>,
        context: NegotiationContext,
    ) -> NegotiationOutcome {
        self.outcome_for(server_url.into(), context).await
    }

    fn outcome_for(
        &self,
        server_url: String,
        context: NegotiationContext,
    ) -> Shared<BoxFuture<'static, NegotiationOutcome>> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = current.as_ref() {
            let failed = matches!(run.outcome.peek(), Some(Err(_)));
            if run.server_url == server_url && run.context == context && !failed {
                debug!(server_url = %server_url, "Joining negotiation");
                return run.outcome.clone();
            }
            if failed {
                debug!(server_url = %server_url, "Previous negotiation failed, starting over");
            } else {
                info!(previous = %run.server_url, server_url = %server_url, "Superseding negotiation");
                run.cancel.cancel();
            }
        }

        *self.published.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.client.set_server_url(server_url.clone());

        let cancel = CancellationToken::new();
        let negotiation = Negotiation {
            client: self.client.clone(),
            server_url: server_url.clone(),
            context,
            cancel: cancel.clone(),
            published: Arc::clone(&self.published),
        };
        let outcome = negotiation.run().boxed().shared();
        *current = Some(Run {
            server_url,
            context,
            cancel,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Features of the last completed negotiation for the live server.
    pub fn features(&self) -> Option<ServerFeatures> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Release name of the live server, once negotiated.
    pub fn version_name(&self) -> Option<String> {
        self.features()
            .and_then(|features| features.version_name().map(str::to_string))
    }
}

impl std::fmt::Debug for CapabilityNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityNegotiator")
            .field("client", &self.client)
            .field("features", &self.features())
            .finish()
    }
}
