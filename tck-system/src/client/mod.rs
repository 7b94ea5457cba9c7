//! Dual-mode dispatch clients.
//!
//! Each client role has one trait with two implementations: [`local`] calls
//! the embedded reference connector's managers in process, [`http`] sends
//! the serialized message to the connector under test. Pipelines only see
//! the trait.
//!
//! ## Negative steps
//!
//! Every sending operation takes `expect_error`. A rejection then counts as
//! the expected outcome and the operation returns `Ok` with no payload;
//! success becomes [`TckError::Expectation`]. Local clients read rejections
//! from the manager result, networked clients from the response status.

use serde_json::Value;
use tck_core::errors::TckError;
use tck_core::message::CanonicalMessage;
use tracing::debug;

pub mod http;
pub mod local;

pub use http::{
    HttpConsumerNegotiationClient, HttpConsumerTransferProcessClient, HttpMetadataClient,
    HttpProviderNegotiationClient, HttpProviderTransferProcessClient,
};
pub use local::{
    LocalConsumerNegotiationClient, LocalConsumerTransferProcessClient, LocalMetadataClient,
    LocalProviderNegotiationClient, LocalProviderTransferProcessClient,
};

// ── Paths ───────────────────────────────────────────────────────────

pub const NEGOTIATION_REQUEST_PATH: &str = "/negotiations/request";

pub fn negotiation_path(pid: &str) -> String {
    format!("/negotiations/{pid}")
}

/// `/negotiations/{pid}/{action}`, e.g. `offers`, `agreement/verification`.
pub fn negotiation_action_path(pid: &str, action: &str) -> String {
    format!("/negotiations/{pid}/{action}")
}

pub const TRANSFER_REQUEST_PATH: &str = "/transfers/request";

pub fn transfer_path(pid: &str) -> String {
    format!("/transfers/{pid}")
}

/// `/transfers/{pid}/{action}`, e.g. `start`, `completion`.
pub fn transfer_action_path(pid: &str, action: &str) -> String {
    format!("/transfers/{pid}/{action}")
}

// ── Client roles ────────────────────────────────────────────────────

/// Talks to a consumer under test; the harness is the provider.
pub trait ConsumerNegotiationClient: Send + Sync {
    /// Asks the consumer to start a negotiation for `offer_id` on `dataset_id`.
    fn initiate_request(&self, dataset_id: &str, offer_id: &str) -> Result<(), TckError>;

    fn contract_offer(
        &self,
        consumer_pid: &str,
        offer: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn contract_agreement(
        &self,
        consumer_pid: &str,
        agreement: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn finalize(
        &self,
        consumer_pid: &str,
        event: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn terminate(
        &self,
        consumer_pid: &str,
        termination: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn get_negotiation(&self, consumer_pid: &str, callback_address: &str)
        -> Result<CanonicalMessage, TckError>;
}

/// Talks to a provider under test; the harness is the consumer.
pub trait ProviderNegotiationClient: Send + Sync {
    /// Initial request or counter-request. `None` when a rejection was expected.
    fn contract_request(
        &self,
        request: &CanonicalMessage,
        counter_party_id: &str,
        expect_error: bool,
    ) -> Result<Option<CanonicalMessage>, TckError>;

    fn accept(&self, event: &CanonicalMessage, expect_error: bool) -> Result<(), TckError>;

    fn verify(&self, verification: &CanonicalMessage, expect_error: bool) -> Result<(), TckError>;

    fn terminate(
        &self,
        provider_pid: &str,
        termination: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn get_negotiation(&self, provider_pid: &str) -> Result<CanonicalMessage, TckError>;
}

/// Talks to a consumer under test; the harness is the provider.
pub trait ConsumerTransferProcessClient: Send + Sync {
    fn initiate_transfer_request(&self, agreement_id: &str, format: &str) -> Result<(), TckError>;

    fn start_transfer(
        &self,
        consumer_pid: &str,
        start: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn complete_transfer(
        &self,
        consumer_pid: &str,
        completion: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn suspend_transfer(
        &self,
        consumer_pid: &str,
        suspension: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn terminate_transfer(
        &self,
        consumer_pid: &str,
        termination: &CanonicalMessage,
        callback_address: &str,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn get_transfer_process(&self, consumer_pid: &str, callback_address: &str)
        -> Result<CanonicalMessage, TckError>;
}

/// Talks to a provider under test; the harness is the consumer.
pub trait ProviderTransferProcessClient: Send + Sync {
    /// `None` when a rejection was expected.
    fn transfer_request(
        &self,
        request: &CanonicalMessage,
        counter_party_id: &str,
        expect_error: bool,
    ) -> Result<Option<CanonicalMessage>, TckError>;

    fn start_transfer(&self, provider_pid: &str, start: &CanonicalMessage, expect_error: bool)
        -> Result<(), TckError>;

    fn complete_transfer(
        &self,
        provider_pid: &str,
        completion: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn suspend_transfer(
        &self,
        provider_pid: &str,
        suspension: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn terminate_transfer(
        &self,
        provider_pid: &str,
        termination: &CanonicalMessage,
        expect_error: bool,
    ) -> Result<(), TckError>;

    fn get_transfer_process(&self, provider_pid: &str) -> Result<CanonicalMessage, TckError>;
}

/// Reads the version metadata of the connector under test.
pub trait MetadataClient: Send + Sync {
    /// The plain JSON metadata document.
    fn get_metadata(&self) -> Result<Value, TckError>;
}

/// Applies the negative-step rule to a local operation.
///
/// # Contract
/// - `Ok(Some(_))`: the work succeeded and no error was expected.
/// - `Ok(None)`: the work was rejected and an error was expected.
/// - Unexpected success fails with `Expectation`; non-rejection errors
///   (transport, timeout) always propagate.
pub(crate) fn expect_outcome<T>(
    operation: &str,
    expect_error: bool,
    result: Result<T, TckError>,
) -> Result<Option<T>, TckError> {
    match result {
        Ok(_) if expect_error => Err(TckError::Expectation(format!(
            "Expected to throw an error on {operation}"
        ))),
        Ok(value) => Ok(Some(value)),
        Err(e) if expect_error && e.is_rejection() => {
            debug!(operation, error = %e, "expected rejection");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_success_is_an_expectation_error() {
        let outcome = expect_outcome("offer", true, Ok(()));
        assert_eq!(
            outcome,
            Err(TckError::Expectation("Expected to throw an error on offer".into()))
        );
    }

    #[test]
    fn expected_rejection_is_swallowed() {
        let rejected: Result<(), _> = Err(TckError::illegal_transition("ACCEPTED", "FINALIZED", &[]));
        assert_eq!(expect_outcome("finalize", true, rejected), Ok(None));
    }

    #[test]
    fn transport_failures_propagate_even_when_expecting_errors() {
        let failed: Result<(), _> = Err(TckError::Transport("refused".into()));
        assert!(matches!(
            expect_outcome("offer", true, failed),
            Err(TckError::Transport(_))
        ));
    }

    #[test]
    fn paths_follow_the_protocol_layout() {
        assert_eq!(negotiation_action_path("p1", "agreement/verification"), "/negotiations/p1/agreement/verification");
        assert_eq!(transfer_action_path("c1", "start"), "/transfers/c1/start");
        assert_eq!(transfer_path("c1"), "/transfers/c1");
    }
}
