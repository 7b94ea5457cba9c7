//! The reference connector behind a callback endpoint.
//!
//! [`ConnectorService`] answers every DSP path for one [`Connector`], so the
//! embedded connector can be served over HTTP and tested as if it were a
//! networked connector. Failures are answered with the status of their
//! failure kind.
//!
//! Paths shared by both roles (`events`, `termination`, the transfer
//! actions and the GETs) are routed to whichever manager owns the pid in
//! the path.

use std::sync::Arc;

use serde_json::Value;
use tck_core::errors::TckError;
use tck_core::message::{CanonicalMessage, Canonicalizer};
use tracing::info;

use crate::connector::Connector;
use crate::endpoint::{CallbackEndpoint, FallibleHandler, InboundRequest, RequestMethod};
use crate::manager::{NegotiationManager, TransferManager};

type Operation = dyn Fn(&Connector, &str, &InboundRequest) -> Result<Option<CanonicalMessage>, TckError>
    + Send
    + Sync;

#[derive(Clone)]
pub struct ConnectorService {
    connector: Connector,
    canonicalizer: Arc<Canonicalizer>,
    counter_party_id: String,
}

impl ConnectorService {
    /// `counter_party_id` is recorded on entities created by inbound requests.
    pub fn new(
        connector: Connector,
        canonicalizer: Arc<Canonicalizer>,
        counter_party_id: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            canonicalizer,
            counter_party_id: counter_party_id.into(),
        }
    }

    /// Registers a handler for every protocol path on `endpoint`.
    pub fn register(&self, endpoint: &CallbackEndpoint) -> Result<(), TckError> {
        // ── Negotiation ──
        self.route(endpoint, "/negotiations/request", |c, party, request| {
            let message = request_message(c, request)?;
            c.provider_negotiation
                .handle_contract_request(&message, party)
                .map(Some)
        })?;
        self.route(endpoint, "/negotiations/[^/]+/request", |c, party, request| {
            let message = request_message(c, request)?;
            c.provider_negotiation
                .handle_contract_request(&message, party)
                .map(Some)
        })?;
        self.route(endpoint, "/negotiations/[^/]+/offers", |c, _, request| {
            c.consumer_negotiation
                .handle_offer(&request_message(c, request)?)
                .map(Some)
        })?;
        self.route(endpoint, "/negotiations/[^/]+/agreement", |c, _, request| {
            c.consumer_negotiation
                .handle_agreement(&request_message(c, request)?)
                .map(Some)
        })?;
        self.route(
            endpoint,
            "/negotiations/[^/]+/agreement/verification",
            |c, _, request| {
                c.provider_negotiation
                    .handle_verified(&request_message(c, request)?)
                    .map(Some)
            },
        )?;
        self.route(endpoint, "/negotiations/[^/]+/events", |c, _, request| {
            let message = request_message(c, request)?;
            if owns_negotiation(&*c.provider_negotiation, request) {
                c.provider_negotiation.handle_accepted(&message).map(Some)
            } else {
                c.consumer_negotiation.handle_finalized(&message).map(Some)
            }
        })?;
        self.route(endpoint, "/negotiations/[^/]+/termination", |c, _, request| {
            let message = request_message(c, request)?;
            negotiation_owner(c, request).handle_termination(&message).map(Some)
        })?;
        self.route(endpoint, "/negotiations/[^/]+", |c, _, request| {
            expect_get(request)?;
            negotiation_owner(c, request)
                .get_negotiation(pid(request)?)
                .map(Some)
        })?;

        // ── Transfer ──
        self.route(endpoint, "/transfers/request", |c, party, request| {
            let message = request_message(c, request)?;
            c.provider_transfer
                .handle_transfer_request(&message, party)
                .map(Some)
        })?;
        self.route(endpoint, "/transfers/[^/]+/start", |c, _, request| {
            let message = request_message(c, request)?;
            transfer_owner(c, request).handle_start(&message).map(Some)
        })?;
        self.route(endpoint, "/transfers/[^/]+/completion", |c, _, request| {
            let message = request_message(c, request)?;
            transfer_owner(c, request).handle_completion(&message).map(Some)
        })?;
        self.route(endpoint, "/transfers/[^/]+/suspension", |c, _, request| {
            let message = request_message(c, request)?;
            transfer_owner(c, request).handle_suspension(&message).map(Some)
        })?;
        self.route(endpoint, "/transfers/[^/]+/termination", |c, _, request| {
            let message = request_message(c, request)?;
            transfer_owner(c, request).handle_termination(&message).map(Some)
        })?;
        self.route(endpoint, "/transfers/[^/]+", |c, _, request| {
            expect_get(request)?;
            transfer_owner(c, request)
                .get_transfer_process(pid(request)?)
                .map(Some)
        })?;

        // ── Metadata ──
        let connector = self.connector.clone();
        let metadata = FallibleHandler::new(move |request: &InboundRequest| -> Result<Option<Value>, TckError> {
            expect_get(request)?;
            Ok(Some(connector.metadata()))
        });
        endpoint.register_protocol_handler(r"/\.well-known/dspace-version", Arc::new(metadata))?;

        info!(address = endpoint.address(), "connector service registered");
        Ok(())
    }

    fn route<F>(&self, endpoint: &CallbackEndpoint, pattern: &str, operation: F) -> Result<(), TckError>
    where
        F: Fn(&Connector, &str, &InboundRequest) -> Result<Option<CanonicalMessage>, TckError>
            + Send
            + Sync
            + 'static,
    {
        let operation: Box<Operation> = Box::new(operation);
        let service = self.clone();
        let handler = FallibleHandler::new(move |request: &InboundRequest| -> Result<Option<Value>, TckError> {
            match operation(&service.connector, &service.counter_party_id, request)? {
                Some(response) => service.canonicalizer.serialize(&response).map(Some),
                None => Ok(None),
            }
        });
        endpoint.register_protocol_handler(pattern, Arc::new(handler))
    }
}

fn request_message(connector: &Connector, request: &InboundRequest) -> Result<CanonicalMessage, TckError> {
    if request.method != RequestMethod::Post {
        return Err(TckError::ValidationFailure(format!(
            "Expected POST for {}",
            request.path
        )));
    }
    connector
        .provider_negotiation
        .store()
        .canonicalizer()
        .canonicalize(request.json_body()?)
}

fn expect_get(request: &InboundRequest) -> Result<(), TckError> {
    match request.method {
        RequestMethod::Get => Ok(()),
        RequestMethod::Post => Err(TckError::ValidationFailure(format!(
            "Expected GET for {}",
            request.path
        ))),
    }
}

/// Pid carried in the second path segment.
fn pid(request: &InboundRequest) -> Result<&str, TckError> {
    request
        .segment(1)
        .ok_or_else(|| TckError::ValidationFailure(format!("No process id in {}", request.path)))
}

fn owns_negotiation(manager: &dyn NegotiationManager, request: &InboundRequest) -> bool {
    pid(request).is_ok_and(|id| manager.find_by_id(id).is_ok())
}

fn negotiation_owner<'a>(connector: &'a Connector, request: &InboundRequest) -> &'a dyn NegotiationManager {
    if owns_negotiation(&*connector.provider_negotiation, request) {
        &*connector.provider_negotiation
    } else {
        &*connector.consumer_negotiation
    }
}

fn transfer_owner<'a>(connector: &'a Connector, request: &InboundRequest) -> &'a dyn TransferManager {
    let owned = pid(request).is_ok_and(|id| connector.provider_transfer.find_by_id(id).is_ok());
    if owned {
        &*connector.provider_transfer
    } else {
        &*connector.consumer_transfer
    }
}
