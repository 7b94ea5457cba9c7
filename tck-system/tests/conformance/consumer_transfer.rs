//! Transfer with the system under test as consumer.

use tck_statemachine::TransferState;
use tck_system::actions::consumer_actions;
use tck_system::manager::TransferManager;

use crate::support::{runtime, AGREEMENT_ID, FORMAT};

#[test]
fn conformance_consumer_transfer_completes_after_start() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.consumer_transfer_mock();
    mock.record_initialized_action(consumer_actions::post_transfer_request(context.clone()));
    mock.record_started_action(consumer_actions::post_complete_transfer(context));

    runtime
        .consumer_transfer_pipeline()
        .expect_transfer_request()
        .initiate_transfer_request(AGREEMENT_ID, FORMAT)
        .then_wait_for_state(TransferState::Requested)
        .expect_completion_message()
        .send_started(false)
        .then_wait_for_state(TransferState::Completed)
        .then_verify_consumer_state(TransferState::Completed)
        .execute()
        .unwrap();

    mock.verify().unwrap();
    let system = runtime.system_connector().consumer_transfer.processes();
    assert_eq!(system.len(), 1);
    assert!(system[0].data_address().is_some());
}

#[test]
fn conformance_consumer_suspends_started_transfer() {
    let runtime = runtime();
    let context = runtime.action_context();
    let mock = runtime.consumer_transfer_mock();
    mock.record_initialized_action(consumer_actions::post_transfer_request(context.clone()));
    mock.record_started_action(consumer_actions::post_suspend_transfer(context));

    runtime
        .consumer_transfer_pipeline()
        .expect_transfer_request()
        .initiate_transfer_request(AGREEMENT_ID, FORMAT)
        .then_wait_for_state(TransferState::Requested)
        .expect_suspension_message()
        .send_started(false)
        .then_wait_for_state(TransferState::Suspended)
        .then_verify_consumer_state(TransferState::Suspended)
        .send_termination(false)
        .then_verify_consumer_state(TransferState::Terminated)
        .execute()
        .unwrap();

    mock.verify().unwrap();
}

#[test]
fn conformance_start_after_termination_is_rejected() {
    let runtime = runtime();
    let mock = runtime.consumer_transfer_mock();
    mock.record_initialized_action(consumer_actions::post_transfer_request(runtime.action_context()));

    runtime
        .consumer_transfer_pipeline()
        .expect_transfer_request()
        .initiate_transfer_request(AGREEMENT_ID, FORMAT)
        .then_wait_for_state(TransferState::Requested)
        .then_wait("consumer correlation", {
            let system = runtime.system_connector().clone();
            move || {
                system
                    .consumer_transfer
                    .processes()
                    .iter()
                    .any(|p| p.state() == TransferState::Requested)
            }
        })
        .send_termination(false)
        .then_verify_consumer_state(TransferState::Terminated)
        .send_started(true)
        .then_verify_consumer_state(TransferState::Terminated)
        .execute()
        .unwrap();
}
