//! Actions of the reference connector playing the consumer.

use std::sync::Arc;

use tck_core::errors::TckError;
use tck_core::messages;
use tck_statemachine::{Negotiation, TransferProcess};

use super::{missing, ActionContext};
use crate::client::{
    negotiation_action_path, transfer_action_path, NEGOTIATION_REQUEST_PATH, TRANSFER_REQUEST_PATH,
};
use crate::manager::{NegotiationManager, TransferManager};
use crate::mock::{NegotiationAction, TransferAction};

const TERMINATION_CODE: &str = "1";

fn provider_pid(negotiation: &Negotiation) -> Result<String, TckError> {
    negotiation
        .provider_pid()
        .ok_or_else(|| missing("provider pid", negotiation.id()))
}

fn transfer_provider_pid(process: &TransferProcess) -> Result<String, TckError> {
    process
        .provider_pid()
        .ok_or_else(|| missing("provider pid", process.id()))
}

// ── Negotiation ─────────────────────────────────────────────────────

/// Sends the initial contract request and records the provider pid from
/// the answer before moving to REQUESTED.
pub fn post_request(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let document = messages::contract_request(
            negotiation.id(),
            negotiation.offer_id(),
            negotiation.dataset_id(),
            &context.own_address,
        );
        let response = context
            .post("contract request", &context.harness_address, NEGOTIATION_REQUEST_PATH, &document)?
            .ok_or_else(|| missing("contract request response", negotiation.id()))?;
        context
            .system
            .consumer_negotiation
            .contract_requested(negotiation.id(), response.provider_pid()?)
    })
}

pub fn post_accepted(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let provider_pid = provider_pid(&negotiation)?;
        context.system.consumer_negotiation.accepted(negotiation.id())?;
        let document = messages::accepted_event(&provider_pid, negotiation.id());
        context
            .post(
                "accepted event",
                &context.harness_address,
                &negotiation_action_path(&provider_pid, "events"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_verification(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let provider_pid = provider_pid(&negotiation)?;
        context.system.consumer_negotiation.verified(negotiation.id())?;
        let document = messages::agreement_verification(&provider_pid, negotiation.id());
        context
            .post(
                "verification",
                &context.harness_address,
                &negotiation_action_path(&provider_pid, "agreement/verification"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_terminate(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let provider_pid = provider_pid(&negotiation)?;
        context.system.consumer_negotiation.terminated(negotiation.id())?;
        let document = messages::negotiation_termination(
            &provider_pid,
            negotiation.id(),
            TERMINATION_CODE,
            &["Consumer terminated the negotiation"],
        );
        context
            .post(
                "termination",
                &context.harness_address,
                &negotiation_action_path(&provider_pid, "termination"),
                &document,
            )
            .map(|_| ())
    })
}

// ── Transfer ────────────────────────────────────────────────────────

/// Sends the transfer request and records the provider pid from the
/// answer before moving to REQUESTED.
pub fn post_transfer_request(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let document = messages::transfer_request(
            process.id(),
            process.agreement_id(),
            process.format(),
            process.data_address().map(|address| address.to_message()),
            &context.own_address,
        );
        let response = context
            .post("transfer request", &context.harness_address, TRANSFER_REQUEST_PATH, &document)?
            .ok_or_else(|| missing("transfer request response", process.id()))?;
        context
            .system
            .consumer_transfer
            .transfer_requested(process.id(), response.provider_pid()?)
    })
}

pub fn post_complete_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let provider_pid = transfer_provider_pid(&process)?;
        context.system.consumer_transfer.completed(process.id())?;
        let document = messages::transfer_completion(&provider_pid, process.id());
        context
            .post(
                "completion",
                &context.harness_address,
                &transfer_action_path(&provider_pid, "completion"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_suspend_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let provider_pid = transfer_provider_pid(&process)?;
        context.system.consumer_transfer.suspended(process.id())?;
        let document = messages::transfer_suspension(
            &provider_pid,
            process.id(),
            "1",
            &["Consumer suspended the transfer"],
        );
        context
            .post(
                "suspension",
                &context.harness_address,
                &transfer_action_path(&provider_pid, "suspension"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_terminate_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let provider_pid = transfer_provider_pid(&process)?;
        context.system.consumer_transfer.terminated(process.id())?;
        let document = messages::transfer_termination(
            &provider_pid,
            process.id(),
            TERMINATION_CODE,
            &["Consumer terminated the transfer"],
        );
        context
            .post(
                "termination",
                &context.harness_address,
                &transfer_action_path(&provider_pid, "termination"),
                &document,
            )
            .map(|_| ())
    })
}
