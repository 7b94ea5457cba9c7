//! Conformance: Request Idempotency
//!
//! A resent request carrying a known consumer pid answers the existing
//! entity and creates nothing new.

use tck_core::constants::TCK_PARTICIPANT_ID;
use tck_core::messages;
use tck_system::client::local::LocalProviderTransferProcessClient;
use tck_system::client::ProviderTransferProcessClient;
use tck_system::manager::TransferManager;

use crate::support::{runtime, AGREEMENT_ID, DATASET_ID, FORMAT, OFFER_ID};

#[test]
fn conformance_resent_transfer_request_creates_one_process() {
    let runtime = runtime();
    let canonicalizer = runtime.canonicalizer();
    let client = LocalProviderTransferProcessClient::new(runtime.system_connector().clone());
    let request = canonicalizer
        .canonicalize(&messages::transfer_request(
            "urn:uuid:resent",
            AGREEMENT_ID,
            FORMAT,
            None,
            "http://localhost:8083",
        ))
        .unwrap();

    let first = client
        .transfer_request(&request, TCK_PARTICIPANT_ID, false)
        .unwrap()
        .unwrap();
    let second = client
        .transfer_request(&request, TCK_PARTICIPANT_ID, false)
        .unwrap()
        .unwrap();

    assert_eq!(first.provider_pid().unwrap(), second.provider_pid().unwrap());
    assert_eq!(first.state_name().unwrap(), second.state_name().unwrap());
    assert_eq!(runtime.system_connector().provider_transfer.processes().len(), 1);
}

#[test]
fn conformance_resent_contract_request_creates_one_negotiation() {
    use tck_system::manager::NegotiationManager;

    let runtime = runtime();
    let canonicalizer = runtime.canonicalizer();
    let system = runtime.system_connector();
    let request = canonicalizer
        .canonicalize(&messages::contract_request(
            "urn:uuid:resent",
            OFFER_ID,
            DATASET_ID,
            "http://localhost:8083",
        ))
        .unwrap();

    let first = system
        .provider_negotiation
        .handle_contract_request(&request, TCK_PARTICIPANT_ID)
        .unwrap();
    let second = system
        .provider_negotiation
        .handle_contract_request(&request, TCK_PARTICIPANT_ID)
        .unwrap();

    assert_eq!(first.provider_pid().unwrap(), second.provider_pid().unwrap());
    assert_eq!(system.provider_negotiation.negotiations().len(), 1);
}
