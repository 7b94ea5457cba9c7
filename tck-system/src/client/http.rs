//! Networked clients: serialize, send through a [`Transport`], judge the
//! outcome by status.
//!
//! Provider-side clients address the configured connector base URL.
//! Consumer-side clients address the callback address the consumer
//! advertised in its request.

use std::sync::Arc;

use serde_json::{json, Value};
use tck_core::constants::{METADATA_PATH, TCK_PARTICIPANT_ID};
use tck_core::errors::TckError;
use tck_core::message::{CanonicalMessage, Canonicalizer};
use tracing::debug;

use super::{
    negotiation_action_path, negotiation_path, transfer_action_path, transfer_path,
    ConsumerNegotiationClient, ConsumerTransferProcessClient, MetadataClient,
    ProviderNegotiationClient, ProviderTransferProcessClient, NEGOTIATION_REQUEST_PATH,
    TRANSFER_REQUEST_PATH,
};
use crate::transport::{Transport, TransportResponse};

/// Shared send/receive plumbing.
#[derive(Clone)]
struct Exchange {
    transport: Arc<dyn Transport>,
    canonicalizer: Arc<Canonicalizer>,
}

impl Exchange {
    fn post(
        &self,
        operation: &str,
        url: &str,
        message: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<Option<TransportResponse>, TckError> {
        let body = self.canonicalizer.serialize(message)?;
        self.post_json(operation, url, &body, expect_error)
    }

    fn post_json(
        &self,
        operation: &str,
        url: &str,
        body: &Value,
        expect_error: bool,
    ) -> Result<Option<TransportResponse>, TckError> {
        let response = self.transport.post(url, body)?;
        debug!(operation, url, status = response.status, "response received");
        check_status(operation, response, expect_error)
    }

    fn get(&self, url: &str) -> Result<CanonicalMessage, TckError> {
        let response = self.transport.get(url)?;
        match check_status("get", response, false)? {
            Some(response) => self.canonical_body(response),
            None => Err(TckError::Expectation(format!("No response body from {url}"))),
        }
    }

    fn canonical_body(&self, response: TransportResponse) -> Result<CanonicalMessage, TckError> {
        let body = response
            .body
            .ok_or_else(|| TckError::ValidationFailure("Empty response body".to_string()))?;
        self.canonicalizer.canonicalize(&body)
    }
}

/// Negative-step rule applied to a response status.
pub(crate) fn check_status(
    operation: &str,
    response: TransportResponse,
    expect_error: bool,
) -> Result<Option<TransportResponse>, TckError> {
    match (response.is_success(), expect_error) {
        (true, false) => Ok(Some(response)),
        (false, true) => {
            debug!(operation, status = response.status, "expected rejection");
            Ok(None)
        }
        (true, true) => Err(TckError::Expectation(format!(
            "Invalid {operation} did not fail: {}",
            response.status
        ))),
        (false, false) => Err(TckError::Protocol {
            status: response.status,
            message: format!("Request {operation} failed: {}", response.body_text()),
        }),
    }
}

pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

// ── Negotiation ─────────────────────────────────────────────────────

pub struct HttpConsumerNegotiationClient {
    exchange: Exchange,
    initiate_url: String,
    harness_address: String,
}

impl HttpConsumerNegotiationClient {
    /// `harness_address` is advertised to the consumer as the provider's
    /// connector address when initiating.
    pub fn new(
        transport: Arc<dyn Transport>,
        canonicalizer: Arc<Canonicalizer>,
        initiate_url: impl Into<String>,
        harness_address: impl Into<String>,
    ) -> Self {
        Self {
            exchange: Exchange {
                transport,
                canonicalizer,
            },
            initiate_url: initiate_url.into(),
            harness_address: harness_address.into(),
        }
    }
}

impl ConsumerNegotiationClient for HttpConsumerNegotiationClient {
    fn initiate_request(&self, dataset_id: &str, offer_id: &str) -> Result<(), TckError> {
        let signal = json!({
            "providerId": TCK_PARTICIPANT_ID,
            "offerId": offer_id,
            "datasetId": dataset_id,
            "connectorAddress": self.harness_address,
        });
        self.exchange
            .post_json("initiate request", &self.initiate_url, &signal, false)
            .map(|_| ())
    }

    fn contract_offer(
        &self,
        consumer_pid: &str,
        offer: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(callback_address, &negotiation_action_path(consumer_pid, "offers"));
        self.exchange.post("offer", &url, offer, expect_error).map(|_| ())
    }

    fn contract_agreement(
        &self,
        consumer_pid: &str,
        agreement: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(callback_address, &negotiation_action_path(consumer_pid, "agreement"));
        self.exchange
            .post("agreement", &url, agreement, expect_error)
            .map(|_| ())
    }

    fn finalize(
        &self,
        consumer_pid: &str,
        event: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(callback_address, &negotiation_action_path(consumer_pid, "events"));
        self.exchange.post("finalize", &url, event, expect_error).map(|_| ())
    }

    fn terminate(
        &self,
        consumer_pid: &str,
        termination: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(callback_address, &negotiation_action_path(consumer_pid, "termination"));
        self.exchange
            .post("termination", &url, termination, expect_error)
            .map(|_| ())
    }

    fn get_negotiation(
        &self,
        consumer_pid: &str,
        callback_address: &str,
    ) -> Result<CanonicalMessage, TckError> {
        self.exchange
            .get(&join(callback_address, &negotiation_path(consumer_pid)))
    }
}

pub struct HttpProviderNegotiationClient {
    exchange: Exchange,
    base_url: String,
}

impl HttpProviderNegotiationClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        canonicalizer: Arc<Canonicalizer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            exchange: Exchange {
                transport,
                canonicalizer,
            },
            base_url: base_url.into(),
        }
    }
}

impl ProviderNegotiationClient for HttpProviderNegotiationClient {
    fn contract_request(
        &self,
        request: &CanonicalMessage,
        _counter_party_id: &str,
        expect_error: bool,
    ) -> Result<Option<CanonicalMessage>, TckError> {
        // A counter-request already carries the provider pid.
        let path = match request.provider_pid() {
            Ok(provider_pid) => negotiation_action_path(provider_pid, "request"),
            Err(_) => NEGOTIATION_REQUEST_PATH.to_string(),
        };
        let url = join(&self.base_url, &path);
        self.exchange
            .post("contract request", &url, request, expect_error)?
            .map(|response| self.exchange.canonical_body(response))
            .transpose()
    }

    fn accept(&self, event: &CanonicalMessage, expect_error: bool) -> Result<(), TckError> {
        let url = join(&self.base_url, &negotiation_action_path(event.provider_pid()?, "events"));
        self.exchange.post("accept", &url, event, expect_error).map(|_| ())
    }

    fn verify(&self, verification: &CanonicalMessage, expect_error: bool) -> Result<(), TckError> {
        let path = negotiation_action_path(verification.provider_pid()?, "agreement/verification");
        self.exchange
            .post("verify", &join(&self.base_url, &path), verification, expect_error)
            .map(|_| ())
    }

    fn terminate(
        &self,
        provider_pid: &str,
        termination: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(&self.base_url, &negotiation_action_path(provider_pid, "termination"));
        self.exchange
            .post("termination", &url, termination, expect_error)
            .map(|_| ())
    }

    fn get_negotiation(&self, provider_pid: &str) -> Result<CanonicalMessage, TckError> {
        self.exchange
            .get(&join(&self.base_url, &negotiation_path(provider_pid)))
    }
}

// ── Transfer ────────────────────────────────────────────────────────

pub struct HttpConsumerTransferProcessClient {
    exchange: Exchange,
    initiate_url: String,
    harness_address: String,
}

impl HttpConsumerTransferProcessClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        canonicalizer: Arc<Canonicalizer>,
        initiate_url: impl Into<String>,
        harness_address: impl Into<String>,
    ) -> Self {
        Self {
            exchange: Exchange {
                transport,
                canonicalizer,
            },
            initiate_url: initiate_url.into(),
            harness_address: harness_address.into(),
        }
    }

    fn send(
        &self,
        operation: &str,
        action: &str,
        consumer_pid: &str,
        message: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(callback_address, &transfer_action_path(consumer_pid, action));
        self.exchange
            .post(operation, &url, message, expect_error)
            .map(|_| ())
    }
}

impl ConsumerTransferProcessClient for HttpConsumerTransferProcessClient {
    fn initiate_transfer_request(&self, agreement_id: &str, format: &str) -> Result<(), TckError> {
        let signal = json!({
            "providerId": TCK_PARTICIPANT_ID,
            "agreementId": agreement_id,
            "format": format,
            "connectorAddress": self.harness_address,
        });
        self.exchange
            .post_json("initiate transfer request", &self.initiate_url, &signal, false)
            .map(|_| ())
    }

    fn start_transfer(
        &self,
        consumer_pid: &str,
        start: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("start", "start", consumer_pid, start, callback_address, expect_error)
    }

    fn complete_transfer(
        &self,
        consumer_pid: &str,
        completion: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("completion", "completion", consumer_pid, completion, callback_address, expect_error)
    }

    fn suspend_transfer(
        &self,
        consumer_pid: &str,
        suspension: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("suspension", "suspension", consumer_pid, suspension, callback_address, expect_error)
    }

    fn terminate_transfer(
        &self,
        consumer_pid: &str,
        termination: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("termination", "termination", consumer_pid, termination, callback_address, expect_error)
    }

    fn get_transfer_process(
        &self,
        consumer_pid: &str,
        callback_address: &str,
    ) -> Result<CanonicalMessage, TckError> {
        self.exchange
            .get(&join(callback_address, &transfer_path(consumer_pid)))
    }
}

pub struct HttpProviderTransferProcessClient {
    exchange: Exchange,
    base_url: String,
}

impl HttpProviderTransferProcessClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        canonicalizer: Arc<Canonicalizer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            exchange: Exchange {
                transport,
                canonicalizer,
            },
            base_url: base_url.into(),
        }
    }

    fn send(
        &self,
        action: &str,
        provider_pid: &str,
        message: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let url = join(&self.base_url, &transfer_action_path(provider_pid, action));
        self.exchange.post(action, &url, message, expect_error).map(|_| ())
    }
}

impl ProviderTransferProcessClient for HttpProviderTransferProcessClient {
    fn transfer_request(
        &self,
        request: &CanonicalMessage,
        _counter_party_id: &str,
        expect_error: bool,
    ) -> Result<Option<CanonicalMessage>, TckError> {
        let url = join(&self.base_url, TRANSFER_REQUEST_PATH);
        self.exchange
            .post("transfer request", &url, request, expect_error)?
            .map(|response| self.exchange.canonical_body(response))
            .transpose()
    }

    fn start_transfer(
        &self,
        provider_pid: &str,
        start: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("start", provider_pid, start, expect_error)
    }

    fn complete_transfer(
        &self,
        provider_pid: &str,
        completion: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("completion", provider_pid, completion, expect_error)
    }

    fn suspend_transfer(
        &self,
        provider_pid: &str,
        suspension: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("suspension", provider_pid, suspension, expect_error)
    }

    fn terminate_transfer(
        &self,
        provider_pid: &str,
        termination: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        self.send("termination", provider_pid, termination, expect_error)
    }

    fn get_transfer_process(&self, provider_pid: &str) -> Result<CanonicalMessage, TckError> {
        self.exchange
            .get(&join(&self.base_url, &transfer_path(provider_pid)))
    }
}

// ── Metadata ────────────────────────────────────────────────────────

/// Fetches `{base}/.well-known/dspace-version`. The document is plain JSON
/// and is returned as received.
pub struct HttpMetadataClient {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl HttpMetadataClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }
}

impl MetadataClient for HttpMetadataClient {
    fn get_metadata(&self) -> Result<Value, TckError> {
        let url = join(&self.base_url, METADATA_PATH);
        let response = self.transport.get(&url)?;
        debug!(url, status = response.status, "metadata response received");
        check_status("metadata", response, false)?
            .and_then(|response| response.body)
            .ok_or_else(|| TckError::ValidationFailure(format!("No metadata document at {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{CallbackEndpoint, InboundRequest};
    use crate::transport::LoopbackTransport;

    fn response(status: u16) -> TransportResponse {
        TransportResponse {
            status,
            body: Some(json!({ "error": "nope" })),
        }
    }

    #[test]
    fn status_judgement() {
        assert!(check_status("offer", response(200), false).unwrap().is_some());
        assert!(check_status("offer", response(409), true).unwrap().is_none());
        assert!(matches!(
            check_status("offer", response(200), true),
            Err(TckError::Expectation(_))
        ));
        assert!(matches!(
            check_status("offer", response(404), false),
            Err(TckError::Protocol { status: 404, .. })
        ));
    }

    #[test]
    fn metadata_is_read_from_the_well_known_path() {
        let endpoint = Arc::new(CallbackEndpoint::new("http://localhost:9090/dsp"));
        endpoint
            .register_handler(r"/\.well-known/dspace-version", |request: &InboundRequest| {
                assert_eq!(request.path, METADATA_PATH);
                Ok(Some(json!({ "protocolVersions": [{ "version": "2025-1", "path": "/" }] })))
            })
            .unwrap();
        let client = HttpMetadataClient::new(
            Arc::new(LoopbackTransport::new(vec![endpoint])),
            "http://localhost:9090/dsp/",
        );
        let metadata = client.get_metadata().unwrap();
        assert_eq!(metadata["protocolVersions"][0]["version"], "2025-1");
    }

    #[test]
    fn missing_metadata_is_a_protocol_error() {
        let endpoint = Arc::new(CallbackEndpoint::new("http://localhost:9090/dsp"));
        let client = HttpMetadataClient::new(
            Arc::new(LoopbackTransport::new(vec![endpoint])),
            "http://localhost:9090/dsp",
        );
        assert!(matches!(
            client.get_metadata(),
            Err(TckError::Protocol { status: 404, .. })
        ));
    }

    #[test]
    fn join_drops_duplicate_slash() {
        assert_eq!(join("http://host/dsp/", "/negotiations/1"), "http://host/dsp/negotiations/1");
    }
}
