//! Negotiation with the system under test as provider.

use tck_core::constants::TCK_PARTICIPANT_ID;
use tck_core::errors::TckError;
use tck_statemachine::NegotiationState;
use tck_system::actions::provider_actions;
use tck_system::manager::NegotiationManager;

use crate::support::{runtime, DATASET_ID, OFFER_ID};

#[test]
fn conformance_provider_negotiation_reaches_finalized() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.provider_negotiation_mock();
    mock.record_contract_requested_action(provider_actions::post_offer(context.clone()));
    mock.record_accepted_action(provider_actions::post_agreement(context.clone()));
    mock.record_verified_action(provider_actions::post_finalized(context));

    runtime
        .provider_negotiation_pipeline()
        .expect_offer_message()
        .send_request_message(DATASET_ID, OFFER_ID, false)
        .then_wait_for_state(NegotiationState::Offered)
        .expect_agreement_message()
        .accept_last_offer(false)
        .then_wait_for_state(NegotiationState::Agreed)
        .expect_finalized_event()
        .send_verified_event(false)
        .then_wait_for_state(NegotiationState::Finalized)
        .then_verify_provider_state(NegotiationState::Finalized)
        .execute()
        .unwrap();

    mock.verify().unwrap();
    let system = runtime.system_connector().provider_negotiation.negotiations();
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].counter_party_id(), TCK_PARTICIPANT_ID);
}

#[test]
fn conformance_provider_terminates_negotiation() {
    let runtime = runtime();
    let mock = runtime.provider_negotiation_mock();
    mock.record_contract_requested_action(provider_actions::post_terminate_negotiation(
        runtime.action_context(),
    ));

    runtime
        .provider_negotiation_pipeline()
        .expect_termination_message()
        .send_request_message(DATASET_ID, OFFER_ID, false)
        .then_wait_for_state(NegotiationState::Terminated)
        .then_verify_provider_state(NegotiationState::Terminated)
        .execute()
        .unwrap();

    mock.verify().unwrap();
}

#[test]
fn conformance_consumer_termination_then_rejected_verification() {
    let runtime = runtime();
    let mock = runtime.provider_negotiation_mock();
    mock.record_contract_requested_action(provider_actions::post_offer(runtime.action_context()));

    runtime
        .provider_negotiation_pipeline()
        .expect_offer_message()
        .send_request_message(DATASET_ID, OFFER_ID, false)
        .then_wait_for_state(NegotiationState::Offered)
        .send_termination(false)
        .then_verify_provider_state(NegotiationState::Terminated)
        .send_verified_event(true)
        .then_verify_provider_state(NegotiationState::Terminated)
        .execute()
        .unwrap();
}

#[test]
fn conformance_provider_state_mismatch_is_reported() {
    let runtime = runtime();
    let result = runtime
        .provider_negotiation_pipeline()
        .send_request_message(DATASET_ID, OFFER_ID, false)
        .then_verify_provider_state(NegotiationState::Agreed)
        .execute();
    assert!(matches!(result, Err(TckError::Expectation(m)) if m.contains("REQUESTED")));
}

#[test]
fn conformance_unverified_mock_actions_fail() {
    let runtime = runtime();
    let mock = runtime.provider_negotiation_mock();
    mock.record_verified_action(provider_actions::post_finalized(runtime.action_context()));

    runtime
        .provider_negotiation_pipeline()
        .send_request_message(DATASET_ID, OFFER_ID, false)
        .then_verify_provider_state(NegotiationState::Requested)
        .execute()
        .unwrap();

    let err = mock.verify().unwrap_err();
    assert!(matches!(err, TckError::Expectation(m) if m.contains("VERIFIED")));
}
