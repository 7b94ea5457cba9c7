//! Transfer pipeline with the system under test as provider. The harness
//! plays the consumer.

use std::sync::Arc;

use parking_lot::Mutex;
use tck_core::constants::TCK_PARTICIPANT_ID;
use tck_core::errors::TckError;
use tck_core::message::Canonicalizer;
use tck_core::messages;
use tck_statemachine::{TransferProcess, TransferState};
use tracing::debug;

use super::{occupied, AsyncPipeline, Slot};
use crate::client::ProviderTransferProcessClient;
use crate::connector::Connector;
use crate::manager::{ConsumerTransferProcessManager, TransferManager};

const SUSPENSION_CODE: &str = "1";
const TERMINATION_CODE: &str = "1";

pub struct ProviderTransferPipeline {
    engine: AsyncPipeline,
    client: Arc<dyn ProviderTransferProcessClient>,
    harness: Connector,
    process: Slot<TransferProcess>,
    connector_under_test_id: String,
}

impl ProviderTransferPipeline {
    pub fn new(
        engine: AsyncPipeline,
        client: Arc<dyn ProviderTransferProcessClient>,
        harness: Connector,
        connector_under_test_id: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            client,
            harness,
            process: Arc::new(Mutex::new(None)),
            connector_under_test_id: connector_under_test_id.into(),
        }
    }

    pub fn process(&self) -> Option<Arc<TransferProcess>> {
        self.process.lock().clone()
    }

    // ── Sends ───────────────────────────────────────────────────────

    /// Sends a `TransferRequestMessage`. As with negotiation requests, the
    /// harness process moves to REQUESTED once the provider answered.
    pub fn send_transfer_request(mut self, agreement_id: &str, format: &str, expect_error: bool) -> Self {
        let consumer = self.harness.consumer_transfer.clone();
        let client = self.client.clone();
        let slot = self.process.clone();
        let canonicalizer = self.engine.canonicalizer().clone();
        let callback_address = self.engine.endpoint().address().to_string();
        let counter_party = self.connector_under_test_id.clone();
        let (agreement_id, format) = (agreement_id.to_string(), format.to_string());
        self.engine.add_stage(move || {
            let process = consumer.create_transfer_process(&agreement_id, &format, None)?;
            *slot.lock() = Some(process.clone());
            let document = messages::transfer_request(
                process.id(),
                &agreement_id,
                &format,
                None,
                &callback_address,
            );
            let message = canonicalizer.canonicalize(&document)?;
            if let Some(response) = client.transfer_request(&message, TCK_PARTICIPANT_ID, expect_error)? {
                consumer.transfer_requested(process.id(), response.provider_pid()?)?;
                debug!(id = process.id(), counter_party = %counter_party, "provider transfer established");
            }
            Ok(())
        });
        self
    }

    /// Restarts a suspended transfer from the consumer side.
    pub fn send_started(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let provider_pid = stage.provider_pid()?;
            let document = messages::transfer_start(&provider_pid, stage.process.id(), None);
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().started(stage.process.id(), None)?;
            }
            stage.client.start_transfer(&provider_pid, &message, expect_error)
        });
        self
    }

    pub fn send_completion(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let provider_pid = stage.provider_pid()?;
            let document = messages::transfer_completion(&provider_pid, stage.process.id());
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().completed(stage.process.id())?;
            }
            stage.client.complete_transfer(&provider_pid, &message, expect_error)
        });
        self
    }

    pub fn send_suspension(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let provider_pid = stage.provider_pid()?;
            let document = messages::transfer_suspension(
                &provider_pid,
                stage.process.id(),
                SUSPENSION_CODE,
                &["TCK consumer suspended the transfer"],
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().suspended(stage.process.id())?;
            }
            stage.client.suspend_transfer(&provider_pid, &message, expect_error)
        });
        self
    }

    pub fn send_termination(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let provider_pid = stage.provider_pid()?;
            let document = messages::transfer_termination(
                &provider_pid,
                stage.process.id(),
                TERMINATION_CODE,
                &["TCK consumer terminated the transfer"],
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.consumer().terminated(stage.process.id())?;
            }
            stage.client.terminate_transfer(&provider_pid, &message, expect_error)
        });
        self
    }

    // ── Expectations ────────────────────────────────────────────────

    pub fn expect_start_message(mut self) -> Self {
        let consumer = self.harness.consumer_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/start", move |message| {
                consumer.handle_start(message)
            });
        self
    }

    pub fn expect_completion_message(mut self) -> Self {
        let consumer = self.harness.consumer_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/completion", move |message| {
                consumer.handle_completion(message)
            });
        self
    }

    pub fn expect_suspension_message(mut self) -> Self {
        let consumer = self.harness.consumer_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/suspension", move |message| {
                consumer.handle_suspension(message)
            });
        self
    }

    pub fn expect_termination_message(mut self) -> Self {
        let consumer = self.harness.consumer_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/termination", move |message| {
                consumer.handle_termination(message)
            });
        self
    }

    // ── Waits ───────────────────────────────────────────────────────

    pub fn then_wait_for_state(mut self, state: TransferState) -> Self {
        let slot = self.process.clone();
        self.engine
            .add_wait(&format!("transfer state {state}"), move || {
                Ok(slot.lock().as_ref().is_some_and(|p| p.state() == state))
            });
        self
    }

    /// Reads the provider's view of the transfer after a pause and fails
    /// with `Expectation` unless it reports `state`.
    pub fn then_verify_provider_state(mut self, state: TransferState) -> Self {
        self.engine.add_pause();
        let slot = self.process.clone();
        let client = self.client.clone();
        self.engine.add_stage(move || {
            let process = occupied(&slot, "transfer process")?;
            let provider_pid = process
                .provider_pid()
                .ok_or_else(|| TckError::MissingCorrelationId(process.state().to_string()))?;
            let response = client.get_transfer_process(&provider_pid)?;
            let actual = response.state_name()?;
            if actual == state.to_string() {
                Ok(())
            } else {
                Err(TckError::Expectation(format!(
                    "Provider transfer process {provider_pid} is {actual}, expected {state}"
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
        let slot = self.process.clone();
        let harness = self.harness.clone();
        let client = self.client.clone();
        let canonicalizer = self.engine.canonicalizer().clone();
        self.engine.add_stage(move || {
            send(&SendStage {
                process: occupied(&slot, "transfer process")?,
                harness,
                client,
                canonicalizer,
            })
        });
    }
}

struct SendStage {
    process: Arc<TransferProcess>,
    harness: Connector,
    client: Arc<dyn ProviderTransferProcessClient>,
    canonicalizer: Arc<Canonicalizer>,
}

impl SendStage {
    fn consumer(&self) -> &ConsumerTransferProcessManager {
        &self.harness.consumer_transfer
    }

    fn provider_pid(&self) -> Result<String, TckError> {
        self.process
            .provider_pid()
            .ok_or_else(|| TckError::MissingCorrelationId(self.process.state().to_string()))
    }
}
