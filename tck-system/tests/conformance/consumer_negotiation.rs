//! Negotiation with the system under test as consumer.

use tck_core::errors::TckError;
use tck_statemachine::NegotiationState;
use tck_system::actions::consumer_actions;
use tck_system::manager::NegotiationManager;

use crate::support::{runtime, DATASET_ID, OFFER_ID};

#[test]
fn conformance_consumer_negotiation_reaches_finalized() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.consumer_negotiation_mock();
    mock.record_initialized_action(consumer_actions::post_request(context.clone()));
    mock.record_offered_action(consumer_actions::post_accepted(context.clone()));
    mock.record_agreed_action(consumer_actions::post_verification(context));

    runtime
        .consumer_negotiation_pipeline()
        .expect_initial_request()
        .initiate_request(DATASET_ID, OFFER_ID)
        .then_wait_for_state(NegotiationState::Requested)
        .expect_accepted_event()
        .send_offer_message(OFFER_ID, DATASET_ID, false)
        .then_wait_for_state(NegotiationState::Accepted)
        .expect_verified_message()
        .send_agreement_message(false)
        .then_wait_for_state(NegotiationState::Verified)
        .send_finalized_event(false)
        .then_verify_consumer_state(NegotiationState::Finalized)
        .execute()
        .unwrap();

    mock.verify().unwrap();
    let harness = runtime.harness_connector().provider_negotiation.negotiations();
    assert_eq!(harness.len(), 1);
    assert_eq!(harness[0].state(), NegotiationState::Finalized);
    assert_eq!(harness[0].dataset_id(), DATASET_ID);
    assert!(harness[0].agreement().is_some());
}

#[test]
fn conformance_finalized_event_after_accepted_is_rejected() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.consumer_negotiation_mock();
    mock.record_initialized_action(consumer_actions::post_request(context.clone()));
    mock.record_offered_action(consumer_actions::post_accepted(context));

    runtime
        .consumer_negotiation_pipeline()
        .expect_initial_request()
        .initiate_request(DATASET_ID, OFFER_ID)
        .then_wait_for_state(NegotiationState::Requested)
        .expect_accepted_event()
        .send_offer_message(OFFER_ID, DATASET_ID, false)
        .then_wait_for_state(NegotiationState::Accepted)
        .send_finalized_event(true)
        .then_verify_consumer_state(NegotiationState::Accepted)
        .execute()
        .unwrap();

    mock.verify().unwrap();
    let system = runtime.system_connector().consumer_negotiation.negotiations();
    assert_eq!(system[0].state(), NegotiationState::Accepted);
}

#[test]
fn conformance_consumer_negotiation_terminated_by_provider() {
    let runtime = runtime();
    let mock = runtime.consumer_negotiation_mock();
    mock.record_initialized_action(consumer_actions::post_request(runtime.action_context()));

    runtime
        .consumer_negotiation_pipeline()
        .expect_initial_request()
        .initiate_request(DATASET_ID, OFFER_ID)
        .then_wait_for_state(NegotiationState::Requested)
        .send_termination(false)
        .then_verify_consumer_state(NegotiationState::Terminated)
        .execute()
        .unwrap();

    mock.verify().unwrap();
}

#[test]
fn conformance_unanswered_request_times_out() {
    let runtime = runtime();
    // No scripted consumer: the request never arrives.
    let result = runtime
        .consumer_negotiation_pipeline()
        .expect_initial_request()
        .initiate_request(DATASET_ID, OFFER_ID)
        .execute();
    assert!(matches!(result, Err(TckError::Timeout(_))));
    assert!(!runtime.endpoint().handles_path("/negotiations/request"));
}

#[test]
fn conformance_unexpected_success_fails_the_pipeline() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.consumer_negotiation_mock();
    mock.record_initialized_action(consumer_actions::post_request(context));

    let result = runtime
        .consumer_negotiation_pipeline()
        .expect_initial_request()
        .initiate_request(DATASET_ID, OFFER_ID)
        .then_wait_for_state(NegotiationState::Requested)
        .send_offer_message(OFFER_ID, DATASET_ID, true)
        .execute();
    assert!(matches!(result, Err(TckError::Expectation(_))));
}
