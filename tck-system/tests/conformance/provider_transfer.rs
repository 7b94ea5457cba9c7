//! Transfer with the system under test as provider.

use tck_statemachine::TransferState;
use tck_system::actions::provider_actions;
use tck_system::manager::TransferManager;

use crate::support::{runtime, AGREEMENT_ID, FORMAT};

#[test]
fn conformance_provider_transfer_starts_and_completes() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.provider_transfer_mock();
    mock.record_requested_action(provider_actions::post_start_transfer(context.clone()));
    mock.record_started_action(provider_actions::post_complete_transfer(context));

    runtime
        .provider_transfer_pipeline()
        .expect_start_message()
        .expect_completion_message()
        .send_transfer_request(AGREEMENT_ID, FORMAT, false)
        .then_wait_for_state(TransferState::Completed)
        .then_verify_provider_state(TransferState::Completed)
        .execute()
        .unwrap();

    mock.verify().unwrap();
    let harness = runtime.harness_connector().consumer_transfer.processes();
    assert_eq!(harness.len(), 1);
    assert_eq!(harness[0].agreement_id(), AGREEMENT_ID);
    assert!(harness[0].data_address().is_some());
}

#[test]
fn conformance_consumer_suspends_and_resumes() {
    let runtime = runtime();
    let mock = runtime.provider_transfer_mock();
    mock.record_requested_action(provider_actions::post_start_transfer(runtime.action_context()));

    runtime
        .provider_transfer_pipeline()
        .expect_start_message()
        .send_transfer_request(AGREEMENT_ID, FORMAT, false)
        .then_wait_for_state(TransferState::Started)
        .send_suspension(false)
        .then_verify_provider_state(TransferState::Suspended)
        .send_started(false)
        .then_verify_provider_state(TransferState::Started)
        .send_completion(false)
        .then_verify_provider_state(TransferState::Completed)
        .send_termination(true)
        .then_verify_provider_state(TransferState::Completed)
        .execute()
        .unwrap();

    mock.verify().unwrap();
}

#[test]
fn conformance_provider_terminates_transfer() {
    let runtime = runtime();
    let mock = runtime.provider_transfer_mock();
    mock.record_requested_action(provider_actions::post_terminate_transfer(
        runtime.action_context(),
    ));

    runtime
        .provider_transfer_pipeline()
        .expect_termination_message()
        .send_transfer_request(AGREEMENT_ID, FORMAT, false)
        .then_wait_for_state(TransferState::Terminated)
        .then_verify_provider_state(TransferState::Terminated)
        .execute()
        .unwrap();

    mock.verify().unwrap();
}

#[test]
fn conformance_completion_before_start_is_rejected() {
    let runtime = runtime();
    runtime
        .provider_transfer_pipeline()
        .send_transfer_request(AGREEMENT_ID, FORMAT, false)
        .then_wait_for_state(TransferState::Requested)
        .send_completion(true)
        .then_verify_provider_state(TransferState::Requested)
        .execute()
        .unwrap();
}
