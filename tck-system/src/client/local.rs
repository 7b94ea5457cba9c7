//! In-process clients backed by the system connector's managers.

use serde_json::Value;
use tck_core::constants::TCK_PARTICIPANT_ID;
use tck_core::errors::TckError;
use tck_core::message::CanonicalMessage;

use super::{
    expect_outcome, ConsumerNegotiationClient, ConsumerTransferProcessClient, MetadataClient,
    ProviderNegotiationClient, ProviderTransferProcessClient,
};
use crate::connector::Connector;
use crate::manager::{NegotiationManager, TransferManager};

fn discard<T>(outcome: Result<Option<T>, TckError>) -> Result<(), TckError> {
    outcome.map(|_| ())
}

// ── Negotiation ─────────────────────────────────────────────────────

pub struct LocalConsumerNegotiationClient {
    system: Connector,
}

impl LocalConsumerNegotiationClient {
    pub fn new(system: Connector) -> Self {
        Self { system }
    }
}

impl ConsumerNegotiationClient for LocalConsumerNegotiationClient {
    fn initiate_request(&self, dataset_id: &str, offer_id: &str) -> Result<(), TckError> {
        self.system
            .consumer_negotiation
            .create_negotiation(dataset_id, offer_id, TCK_PARTICIPANT_ID)
            .map(|_| ())
    }

    fn contract_offer(
        &self,
        _consumer_pid: &str,
        offer: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_negotiation.handle_offer(offer);
        discard(expect_outcome("offer", expect_error, result))
    }

    fn contract_agreement(
        &self,
        _consumer_pid: &str,
        agreement: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_negotiation.handle_agreement(agreement);
        discard(expect_outcome("agreement", expect_error, result))
    }

    fn finalize(
        &self,
        _consumer_pid: &str,
        event: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_negotiation.handle_finalized(event);
        discard(expect_outcome("finalize", expect_error, result))
    }

    fn terminate(
        &self,
        _consumer_pid: &str,
        termination: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_negotiation.handle_termination(termination);
        discard(expect_outcome("termination", expect_error, result))
    }

    fn get_negotiation(
        &self,
        consumer_pid: &str,
        _callback_address: &str,
    ) -> Result<CanonicalMessage, TckError> {
        self.system.consumer_negotiation.get_negotiation(consumer_pid)
    }
}

pub struct LocalProviderNegotiationClient {
    system: Connector,
}

impl LocalProviderNegotiationClient {
    pub fn new(system: Connector) -> Self {
        Self { system }
    }
}

impl ProviderNegotiationClient for LocalProviderNegotiationClient {
    fn contract_request(
        &self,
        request: &CanonicalMessage,
        counter_party_id: &str,
        expect_error: bool,
    ) -> Result<Option<CanonicalMessage>, TckError> {
        let result = self
            .system
            .provider_negotiation
            .handle_contract_request(request, counter_party_id);
        expect_outcome("contractRequest", expect_error, result)
    }

    fn accept(&self, event: &CanonicalMessage, expect_error: bool) -> Result<(), TckError> {
        let result = self.system.provider_negotiation.handle_accepted(event);
        discard(expect_outcome("accept", expect_error, result))
    }

    fn verify(&self, verification: &CanonicalMessage, expect_error: bool) -> Result<(), TckError> {
        let result = self.system.provider_negotiation.handle_verified(verification);
        discard(expect_outcome("verify", expect_error, result))
    }

    fn terminate(
        &self,
        _provider_pid: &str,
        termination: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.provider_negotiation.handle_termination(termination);
        discard(expect_outcome("termination", expect_error, result))
    }

    fn get_negotiation(&self, provider_pid: &str) -> Result<CanonicalMessage, TckError> {
        self.system.provider_negotiation.get_negotiation(provider_pid)
    }
}

// ── Transfer ────────────────────────────────────────────────────────

pub struct LocalConsumerTransferProcessClient {
    system: Connector,
}

impl LocalConsumerTransferProcessClient {
    pub fn new(system: Connector) -> Self {
        Self { system }
    }
}

impl ConsumerTransferProcessClient for LocalConsumerTransferProcessClient {
    fn initiate_transfer_request(&self, agreement_id: &str, format: &str) -> Result<(), TckError> {
        self.system
            .consumer_transfer
            .create_transfer_process(agreement_id, format, None)
            .map(|_| ())
    }

    fn start_transfer(
        &self,
        _consumer_pid: &str,
        start: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_transfer.handle_start(start);
        discard(expect_outcome("start", expect_error, result))
    }

    fn complete_transfer(
        &self,
        _consumer_pid: &str,
        completion: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_transfer.handle_completion(completion);
        discard(expect_outcome("completion", expect_error, result))
    }

    fn suspend_transfer(
        &self,
        _consumer_pid: &str,
        suspension: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_transfer.handle_suspension(suspension);
        discard(expect_outcome("suspension", expect_error, result))
    }

    fn terminate_transfer(
        &self,
        _consumer_pid: &str,
        termination: &CanonicalMessage,
        _callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.consumer_transfer.handle_termination(termination);
        discard(expect_outcome("termination", expect_error, result))
    }

    fn get_transfer_process(
        &self,
        consumer_pid: &str,
        _callback_address: &str,
    ) -> Result<CanonicalMessage, TckError> {
        self.system.consumer_transfer.get_transfer_process(consumer_pid)
    }
}

pub struct LocalProviderTransferProcessClient {
    system: Connector,
}

impl LocalProviderTransferProcessClient {
    pub fn new(system: Connector) -> Self {
        Self { system }
    }
}

impl ProviderTransferProcessClient for LocalProviderTransferProcessClient {
    fn transfer_request(
        &self,
        request: &CanonicalMessage,
        counter_party_id: &str,
        expect_error: bool,
    ) -> Result<Option<CanonicalMessage>, TckError> {
        let result = self
            .system
            .provider_transfer
            .handle_transfer_request(request, counter_party_id);
        expect_outcome("transferRequest", expect_error, result)
    }

    fn start_transfer(
        &self,
        _provider_pid: &str,
        start: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.provider_transfer.handle_start(start);
        discard(expect_outcome("start", expect_error, result))
    }

    fn complete_transfer(
        &self,
        _provider_pid: &str,
        completion: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.provider_transfer.handle_completion(completion);
        discard(expect_outcome("completion", expect_error, result))
    }

    fn suspend_transfer(
        &self,
        _provider_pid: &str,
        suspension: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.provider_transfer.handle_suspension(suspension);
        discard(expect_outcome("suspension", expect_error, result))
    }

    fn terminate_transfer(
        &self,
        _provider_pid: &str,
        termination: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError> {
        let result = self.system.provider_transfer.handle_termination(termination);
        discard(expect_outcome("termination", expect_error, result))
    }

    fn get_transfer_process(&self, provider_pid: &str) -> Result<CanonicalMessage, TckError> {
        self.system.provider_transfer.get_transfer_process(provider_pid)
    }
}

// ── Metadata ────────────────────────────────────────────────────────

pub struct LocalMetadataClient {
    system: Connector,
}

impl LocalMetadataClient {
    pub fn new(system: Connector) -> Self {
        Self { system }
    }
}

impl MetadataClient for LocalMetadataClient {
    fn get_metadata(&self) -> Result<Value, TckError> {
        Ok(self.system.metadata())
    }
}
