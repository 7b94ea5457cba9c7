//! Negotiation pipeline with the system under test as consumer. The
//! harness plays the provider through the harness connector's provider
//! negotiation manager.

use std::sync::Arc;

use parking_lot::Mutex;
use tck_core::constants::TCK_PARTICIPANT_ID;
use tck_core::errors::TckError;
use tck_core::message::Canonicalizer;
use tck_core::messages;
use tck_statemachine::{Negotiation, NegotiationState};
use tracing::debug;

use super::{occupied, AsyncPipeline, Slot};
use crate::client::ConsumerNegotiationClient;
use crate::connector::Connector;
use crate::manager::{NegotiationManager, ProviderNegotiationManager};

const TERMINATION_CODE: &str = "1";
const TERMINATION_REASON: &str = "TCK provider terminated the negotiation";

pub struct ConsumerNegotiationPipeline {
    engine: AsyncPipeline,
    client: Arc<dyn ConsumerNegotiationClient>,
    harness: Connector,
    negotiation: Slot<Negotiation>,
    connector_under_test_id: String,
}

impl ConsumerNegotiationPipeline {
    pub fn new(
        engine: AsyncPipeline,
        client: Arc<dyn ConsumerNegotiationClient>,
        harness: Connector,
        connector_under_test_id: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            client,
            harness,
            negotiation: Arc::new(Mutex::new(None)),
            connector_under_test_id: connector_under_test_id.into(),
        }
    }

    /// The harness negotiation, once the initial request arrived.
    pub fn negotiation(&self) -> Option<Arc<Negotiation>> {
        self.negotiation.lock().clone()
    }

    /// Signals the consumer to request `offer_id` on `dataset_id`.
    pub fn initiate_request(mut self, dataset_id: &str, offer_id: &str) -> Self {
        let client = self.client.clone();
        let (dataset_id, offer_id) = (dataset_id.to_string(), offer_id.to_string());
        self.engine
            .add_stage(move || client.initiate_request(&dataset_id, &offer_id));
        self
    }

    // ── Expectations ────────────────────────────────────────────────

    /// Initial `ContractRequestMessage`; establishes the harness negotiation.
    pub fn expect_initial_request(mut self) -> Self {
        let provider = self.harness.provider_negotiation.clone();
        let slot = self.negotiation.clone();
        let counter_party = self.connector_under_test_id.clone();
        self.engine
            .add_expectation("/negotiations/request", move |message| {
                let response = provider.handle_contract_request(message, &counter_party)?;
                let negotiation = provider.find_by_id(response.provider_pid()?)?;
                debug!(id = negotiation.id(), "consumer negotiation established");
                *slot.lock() = Some(negotiation);
                Ok(response)
            });
        self
    }

    /// Counter-request on an offered negotiation.
    pub fn expect_request(mut self) -> Self {
        let provider = self.harness.provider_negotiation.clone();
        let counter_party = self.connector_under_test_id.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/request", move |message| {
                provider.handle_contract_request(message, &counter_party)
            });
        self
    }

    pub fn expect_accepted_event(mut self) -> Self {
        let provider = self.harness.provider_negotiation.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/events", move |message| {
                provider.handle_accepted(message)
            });
        self
    }

    pub fn expect_verified_message(mut self) -> Self {
        let provider = self.harness.provider_negotiation.clone();
        self.engine.add_expectation(
            "/negotiations/[^/]+/agreement/verification",
            move |message| provider.handle_verified(message),
        );
        self
    }

    pub fn expect_termination_message(mut self) -> Self {
        let provider = self.harness.provider_negotiation.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/termination", move |message| {
                provider.handle_termination(message)
            });
        self
    }

    // ── Sends ───────────────────────────────────────────────────────

    /// Sends an offer. Unless an error is expected the harness negotiation
    /// moves to OFFERED first.
    pub fn send_offer_message(mut self, offer_id: &str, dataset_id: &str, expect_error: bool) -> Self {
        self.engine.add_pause();
        let (offer_id, dataset_id) = (offer_id.to_string(), dataset_id.to_string());
        self.add_send(move |stage| {
            let document = messages::contract_offer(
                stage.negotiation.id(),
                &stage.consumer_pid()?,
                &offer_id,
                TCK_PARTICIPANT_ID,
                &dataset_id,
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage
                    .provider()
                    .offered(stage.negotiation.id(), message.offer()?.clone())?;
            }
            stage.client.contract_offer(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
        });
        self
    }

    pub fn send_agreement_message(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::contract_agreement(
                stage.negotiation.id(),
                &stage.consumer_pid()?,
                TCK_PARTICIPANT_ID,
                stage.negotiation.counter_party_id(),
                stage.negotiation.dataset_id(),
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage
                    .provider()
                    .agreed(stage.negotiation.id(), message.agreement()?.clone())?;
            }
            stage.client.contract_agreement(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
        });
        self
    }

    pub fn send_finalized_event(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::finalized_event(stage.negotiation.id(), &stage.consumer_pid()?);
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.provider().finalized(stage.negotiation.id())?;
            }
            stage.client.finalize(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
        });
        self
    }

    pub fn send_termination(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::negotiation_termination(
                stage.negotiation.id(),
                &stage.consumer_pid()?,
                TERMINATION_CODE,
                &[TERMINATION_REASON],
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.provider().terminated(stage.negotiation.id())?;
            }
            stage.client.terminate(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
        });
        self
    }

    // ── Waits ───────────────────────────────────────────────────────

    /// Polls the harness negotiation until it reaches `state`.
    pub fn then_wait_for_state(mut self, state: NegotiationState) -> Self {
        let slot = self.negotiation.clone();
        self.engine
            .add_wait(&format!("negotiation state {state}"), move || {
                Ok(slot.lock().as_ref().is_some_and(|n| n.state() == state))
            });
        self
    }

    /// Polls the consumer's view of the negotiation until it reports `state`.
    pub fn then_verify_consumer_state(mut self, state: NegotiationState) -> Self {
        let slot = self.negotiation.clone();
        let client = self.client.clone();
        let expected = state.to_string();
        self.engine
            .add_wait(&format!("consumer negotiation state {state}"), move || {
                let negotiation = occupied(&slot, "negotiation")?;
                let consumer_pid = negotiation
                    .consumer_pid()
                    .ok_or_else(|| TckError::MissingCorrelationId(negotiation.state().to_string()))?;
                let callback_address = negotiation.callback_address().unwrap_or_default();
                let response = client.get_negotiation(&consumer_pid, callback_address)?;
                Ok(response.state_name()? == expected)
            });
        self
    }

    pub fn then_wait(mut self, description: &str, predicate: impl Fn() -> bool + Send + 'static) -> Self {
        self.engine = self.engine.then_wait(description, predicate);
        self
    }

    pub fn then_pause(mut self) -> Self {
        self.engine.add_pause();
        self
    }

    pub fn execute(self) -> Result<(), TckError> {
        self.engine.execute()
    }

    fn add_send<F>(&mut self, send: F)
    where
        F: FnOnce(&SendStage) -> Result<(), TckError> + Send + 'static,
    {
        let slot = self.negotiation.clone();
        let harness = self.harness.clone();
        let client = self.client.clone();
        let canonicalizer = self.engine.canonicalizer().clone();
        self.engine.add_stage(move || {
            let negotiation = occupied(&slot, "negotiation")?;
            debug!(id = negotiation.id(), "harness send");
            send(&SendStage {
                negotiation,
                harness,
                client,
                canonicalizer,
            })
        });
    }
}

/// What a send stage sees once it runs.
struct SendStage {
    negotiation: Arc<Negotiation>,
    harness: Connector,
    client: Arc<dyn ConsumerNegotiationClient>,
    canonicalizer: Arc<Canonicalizer>,
}

impl SendStage {
    fn provider(&self) -> &ProviderNegotiationManager {
        &self.harness.provider_negotiation
    }

    fn consumer_pid(&self) -> Result<String, TckError> {
        self.negotiation
            .consumer_pid()
            .ok_or_else(|| TckError::MissingCorrelationId(self.negotiation.state().to_string()))
    }

    fn callback_address(&self) -> Result<&str, TckError> {
        self.negotiation.callback_address().ok_or_else(|| {
            TckError::ValidationFailure(format!(
                "Negotiation {} has no callback address",
                self.negotiation.id()
            ))
        })
    }
}
