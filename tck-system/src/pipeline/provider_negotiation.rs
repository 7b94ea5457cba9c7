//! Negotiation pipeline with the system under test as provider. The
//! harness plays the consumer through the harness connector's consumer
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
use crate::client::ProviderNegotiationClient;
use crate::connector::Connector;
use crate::manager::{ConsumerNegotiationManager, NegotiationManager};

const TERMINATION_CODE: &str = "1";
const TERMINATION_REASON: &str = "TCK consumer terminated the negotiation";

pub struct ProviderNegotiationPipeline {
    engine: AsyncPipeline,
    client: Arc<dyn ProviderNegotiationClient>,
    harness: Connector,
    negotiation: Slot<Negotiation>,
    connector_under_test_id: String,
}

impl ProviderNegotiationPipeline {
    pub fn new(
        engine: AsyncPipeline,
        client: Arc<dyn ProviderNegotiationClient>,
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

    /// The harness negotiation, once the request stage has run.
    pub fn negotiation(&self) -> Option<Arc<Negotiation>> {
        self.negotiation.lock().clone()
    }

    // ── Sends ───────────────────────────────────────────────────────

    /// Sends the initial `ContractRequestMessage`.
    ///
    /// # Contract
    /// - The harness negotiation is created before sending.
    /// - It moves to REQUESTED only after the provider answered, since the
    ///   transition needs the provider pid carried by the answer.
    /// - A rejected request leaves it INITIALIZED.
    pub fn send_request_message(mut self, dataset_id: &str, offer_id: &str, expect_error: bool) -> Self {
        let consumer = self.harness.consumer_negotiation.clone();
        let client = self.client.clone();
        let slot = self.negotiation.clone();
        let canonicalizer = self.engine.canonicalizer().clone();
        let callback_address = self.engine.endpoint().address().to_string();
        let counter_party = self.connector_under_test_id.clone();
        let (dataset_id, offer_id) = (dataset_id.to_string(), offer_id.to_string());
        self.engine.add_stage(move || {
            let negotiation = consumer.create_negotiation(&dataset_id, &offer_id, &counter_party)?;
            *slot.lock() = Some(negotiation.clone());
            let document = messages::contract_request(
                negotiation.id(),
                &offer_id,
                &dataset_id,
                &callback_address,
            );
            let message = canonicalizer.canonicalize(&document)?;
            let response = client.contract_request(&message, TCK_PARTICIPANT_ID, expect_error)?;
            if let Some(response) = response {
                consumer.contract_requested(negotiation.id(), response.provider_pid()?)?;
                debug!(id = negotiation.id(), "provider negotiation established");
            }
            Ok(())
        });
        self
    }

    pub fn send_counter_offer_message(mut self, offer_id: &str, dataset_id: &str, expect_error: bool) -> Self {
        self.engine.add_pause();
        let (offer_id, dataset_id) = (offer_id.to_string(), dataset_id.to_string());
        let callback_address = self.engine.endpoint().address().to_string();
        self.add_send(move |stage| {
            let document = messages::counter_request(
                &stage.provider_pid()?,
                stage.negotiation.id(),
                &offer_id,
                &dataset_id,
                &callback_address,
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage
                    .consumer()
                    .counter_requested(stage.negotiation.id(), message.offer()?.clone())?;
            }
            stage
                .client
                .contract_request(&message, TCK_PARTICIPANT_ID, expect_error)
                .map(|_| ())
        });
        self
    }

    /// Accepts the provider's most recent offer.
    pub fn accept_last_offer(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::accepted_event(&stage.provider_pid()?, stage.negotiation.id());
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().accepted(stage.negotiation.id())?;
            }
            stage.client.accept(&message, expect_error)
        });
        self
    }

    pub fn send_verified_event(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document =
                messages::agreement_verification(&stage.provider_pid()?, stage.negotiation.id());
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().verified(stage.negotiation.id())?;
            }
            stage.client.verify(&message, expect_error)
        });
        self
    }

    pub fn send_termination(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let provider_pid = stage.provider_pid()?;
            let document = messages::negotiation_termination(
                &provider_pid,
                stage.negotiation.id(),
                TERMINATION_CODE,
                &[TERMINATION_REASON],
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().terminated(stage.negotiation.id())?;
            }
            stage.client.terminate(&provider_pid, &message, expect_error)
        });
        self
    }

    // ── Expectations ────────────────────────────────────────────────

    pub fn expect_offer_message(mut self) -> Self {
        let consumer = self.harness.consumer_negotiation.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/offers", move |message| {
                consumer.handle_offer(message)
            });
        self
    }

    pub fn expect_agreement_message(mut self) -> Self {
        let consumer = self.harness.consumer_negotiation.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/agreement", move |message| {
                consumer.handle_agreement(message)
            });
        self
    }

    pub fn expect_finalized_event(mut self) -> Self {
        let consumer = self.harness.consumer_negotiation.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/events", move |message| {
                consumer.handle_finalized(message)
            });
        self
    }

    pub fn expect_termination_message(mut self) -> Self {
        let consumer = self.harness.consumer_negotiation.clone();
        self.engine
            .add_expectation("/negotiations/[^/]+/termination", move |message| {
                consumer.handle_termination(message)
            });
        self
    }

    // ── Waits ───────────────────────────────────────────────────────

    pub fn then_wait_for_state(mut self, state: NegotiationState) -> Self {
        let slot = self.negotiation.clone();
        self.engine
            .add_wait(&format!("negotiation state {state}"), move || {
                Ok(slot.lock().as_ref().is_some_and(|n| n.state() == state))
            });
        self
    }

    /// Reads the provider's view of the negotiation after a pause and
    /// fails with `Expectation` unless it reports `state`.
    pub fn then_verify_provider_state(mut self, state: NegotiationState) -> Self {
        self.engine.add_pause();
        let slot = self.negotiation.clone();
        let client = self.client.clone();
        self.engine.add_stage(move || {
            let negotiation = occupied(&slot, "negotiation")?;
            let provider_pid = negotiation
                .provider_pid()
                .ok_or_else(|| TckError::MissingCorrelationId(negotiation.state().to_string()))?;
            let response = client.get_negotiation(&provider_pid)?;
            let actual = response.state_name()?;
            if actual == state.to_string() {
                Ok(())
            } else {
                Err(TckError::Expectation(format!(
                    "Provider negotiation {provider_pid} is {actual}, expected {state}"
                )))
            }
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
            send(&SendStage {
                negotiation: occupied(&slot, "negotiation")?,
                harness,
                client,
                canonicalizer,
            })
        });
    }
}

struct SendStage {
    negotiation: Arc<Negotiation>,
    harness: Connector,
    client: Arc<dyn ProviderNegotiationClient>,
    canonicalizer: Arc<Canonicalizer>,
}

impl SendStage {
    fn consumer(&self) -> &ConsumerNegotiationManager {
        &self.harness.consumer_negotiation
    }

    fn provider_pid(&self) -> Result<String, TckError> {
        self.negotiation
            .provider_pid()
            .ok_or_else(|| TckError::MissingCorrelationId(self.negotiation.state().to_string()))
    }
}
