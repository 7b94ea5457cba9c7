//! Transfer pipeline with the system under test as consumer. The harness
//! plays the provider.

use std::sync::Arc;

use parking_lot::Mutex;
use tck_core::errors::TckError;
use tck_core::message::Canonicalizer;
use tck_core::messages;
use tck_statemachine::{DataAddress, TransferProcess, TransferState};
use tracing::debug;

use super::{occupied, AsyncPipeline, Slot};
use crate::client::ConsumerTransferProcessClient;
use crate::connector::Connector;
use crate::manager::{ProviderTransferProcessManager, TransferManager};

const SUSPENSION_CODE: &str = "1";
const TERMINATION_CODE: &str = "1";

pub struct ConsumerTransferPipeline {
    engine: AsyncPipeline,
    client: Arc<dyn ConsumerTransferProcessClient>,
    harness: Connector,
    process: Slot<TransferProcess>,
    connector_under_test_id: String,
}

impl ConsumerTransferPipeline {
    pub fn new(
        engine: AsyncPipeline,
        client: Arc<dyn ConsumerTransferProcessClient>,
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

    /// The harness transfer process, once the request arrived.
    pub fn process(&self) -> Option<Arc<TransferProcess>> {
        self.process.lock().clone()
    }

    /// Signals the consumer to request a transfer under `agreement_id`.
    pub fn initiate_transfer_request(mut self, agreement_id: &str, format: &str) -> Self {
        let client = self.client.clone();
        let (agreement_id, format) = (agreement_id.to_string(), format.to_string());
        self.engine
            .add_stage(move || client.initiate_transfer_request(&agreement_id, &format));
        self
    }

    // ── Expectations ────────────────────────────────────────────────

    /// `TransferRequestMessage`; establishes the harness transfer process.
    pub fn expect_transfer_request(mut self) -> Self {
        let provider = self.harness.provider_transfer.clone();
        let slot = self.process.clone();
        let counter_party = self.connector_under_test_id.clone();
        self.engine.add_expectation("/transfers/request", move |message| {
            let response = provider.handle_transfer_request(message, &counter_party)?;
            let process = provider.find_by_id(response.provider_pid()?)?;
            debug!(id = process.id(), "consumer transfer established");
            *slot.lock() = Some(process);
            Ok(response)
        });
        self
    }

    pub fn expect_completion_message(mut self) -> Self {
        let provider = self.harness.provider_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/completion", move |message| {
                provider.handle_completion(message)
            });
        self
    }

    pub fn expect_suspension_message(mut self) -> Self {
        let provider = self.harness.provider_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/suspension", move |message| {
                provider.handle_suspension(message)
            });
        self
    }

    pub fn expect_termination_message(mut self) -> Self {
        let provider = self.harness.provider_transfer.clone();
        self.engine
            .add_expectation("/transfers/[^/]+/termination", move |message| {
                provider.handle_termination(message)
            });
        self
    }

    // ── Sends ───────────────────────────────────────────────────────

    /// Starts the transfer, handing the consumer the default pull address.
    pub fn send_started(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::transfer_start(
                stage.process.id(),
                &stage.consumer_pid()?,
                Some(messages::default_data_address()),
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                let address = message
                    .data_address()
                    .map(DataAddress::from_canonical)
                    .transpose()?;
                stage.provider().started(stage.process.id(), address)?;
            }
            stage.client.start_transfer(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
        });
        self
    }

    pub fn send_completion(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::transfer_completion(stage.process.id(), &stage.consumer_pid()?);
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.provider().completed(stage.process.id())?;
            }
            stage.client.complete_transfer(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
        });
        self
    }

    pub fn send_suspension(mut self, expect_error: bool) -> Self {
        self.engine.add_pause();
        self.add_send(move |stage| {
            let document = messages::transfer_suspension(
                stage.process.id(),
                &stage.consumer_pid()?,
                SUSPENSION_CODE,
                &["TCK provider suspended the transfer"],
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.provider().suspended(stage.process.id())?;
            }
            stage.client.suspend_transfer(
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
            let document = messages::transfer_termination(
                stage.process.id(),
                &stage.consumer_pid()?,
                TERMINATION_CODE,
                &["TCK provider terminated the transfer"],
            );
            let message = stage.canonicalizer.canonicalize(&document)?;
            if !expect_error {
                stage.provider().terminated(stage.process.id())?;
            }
            stage.client.terminate_transfer(
                &stage.consumer_pid()?,
                &message,
                stage.callback_address()?,
                expect_error,
            )
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

    /// Polls the consumer's view of the transfer until it reports `state`.
    pub fn then_verify_consumer_state(mut self, state: TransferState) -> Self {
        let slot = self.process.clone();
        let client = self.client.clone();
        let expected = state.to_string();
        self.engine
            .add_wait(&format!("consumer transfer state {state}"), move || {
                let process = occupied(&slot, "transfer process")?;
                let consumer_pid = process
                    .consumer_pid()
                    .ok_or_else(|| TckError::MissingCorrelationId(process.state().to_string()))?;
                let callback_address = process.callback_address().unwrap_or_default();
                let response = client.get_transfer_process(&consumer_pid, callback_address)?;
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
    client: Arc<dyn ConsumerTransferProcessClient>,
    canonicalizer: Arc<Canonicalizer>,
}

impl SendStage {
    fn provider(&self) -> &ProviderTransferProcessManager {
        &self.harness.provider_transfer
    }

    fn consumer_pid(&self) -> Result<String, TckError> {
        self.process
            .consumer_pid()
            .ok_or_else(|| TckError::MissingCorrelationId(self.process.state().to_string()))
    }

    fn callback_address(&self) -> Result<&str, TckError> {
        self.process.callback_address().ok_or_else(|| {
            TckError::ValidationFailure(format!(
                "Transfer process {} has no callback address",
                self.process.id()
            ))
        })
    }
}
