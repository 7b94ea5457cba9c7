//! Actions of the reference connector playing the provider. Messages go to
//! the callback address the consumer sent with its request.

use std::sync::Arc;

use tck_core::errors::TckError;
use tck_core::messages;
use tck_statemachine::{DataAddress, Negotiation, TransferProcess};

use super::{missing, ActionContext};
use crate::client::{negotiation_action_path, transfer_action_path};
use crate::manager::{NegotiationManager, TransferManager};
use crate::mock::{NegotiationAction, TransferAction};

const TERMINATION_CODE: &str = "1";

/// Consumer pid and callback address of a provider-side negotiation.
fn negotiation_route(negotiation: &Negotiation) -> Result<(String, String), TckError> {
    let consumer_pid = negotiation
        .consumer_pid()
        .ok_or_else(|| missing("consumer pid", negotiation.id()))?;
    let callback = negotiation
        .callback_address()
        .ok_or_else(|| missing("callback address", negotiation.id()))?;
    Ok((consumer_pid, callback.to_string()))
}

fn transfer_route(process: &TransferProcess) -> Result<(String, String), TckError> {
    let consumer_pid = process
        .consumer_pid()
        .ok_or_else(|| missing("consumer pid", process.id()))?;
    let callback = process
        .callback_address()
        .ok_or_else(|| missing("callback address", process.id()))?;
    Ok((consumer_pid, callback.to_string()))
}

// ── Negotiation ─────────────────────────────────────────────────────

/// Offers the negotiation's offer back to the consumer.
pub fn post_offer(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let (consumer_pid, callback) = negotiation_route(&negotiation)?;
        let document = messages::contract_offer(
            negotiation.id(),
            &consumer_pid,
            negotiation.offer_id(),
            &context.participant_id,
            negotiation.dataset_id(),
        );
        let offer = context.canonicalizer.canonicalize(&document)?.offer()?.clone();
        context.system.provider_negotiation.offered(negotiation.id(), offer)?;
        context
            .post(
                "offer",
                &callback,
                &negotiation_action_path(&consumer_pid, "offers"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_agreement(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let (consumer_pid, callback) = negotiation_route(&negotiation)?;
        let document = messages::contract_agreement(
            negotiation.id(),
            &consumer_pid,
            &context.participant_id,
            negotiation.counter_party_id(),
            negotiation.dataset_id(),
        );
        let agreement = context
            .canonicalizer
            .canonicalize(&document)?
            .agreement()?
            .clone();
        context
            .system
            .provider_negotiation
            .agreed(negotiation.id(), agreement)?;
        context
            .post(
                "agreement",
                &callback,
                &negotiation_action_path(&consumer_pid, "agreement"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_finalized(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let (consumer_pid, callback) = negotiation_route(&negotiation)?;
        context.system.provider_negotiation.finalized(negotiation.id())?;
        let document = messages::finalized_event(negotiation.id(), &consumer_pid);
        context
            .post(
                "finalized event",
                &callback,
                &negotiation_action_path(&consumer_pid, "events"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_terminate_negotiation(context: ActionContext) -> NegotiationAction {
    Box::new(move |negotiation: Arc<Negotiation>| {
        let (consumer_pid, callback) = negotiation_route(&negotiation)?;
        context.system.provider_negotiation.terminated(negotiation.id())?;
        let document = messages::negotiation_termination(
            negotiation.id(),
            &consumer_pid,
            TERMINATION_CODE,
            &["Provider terminated the negotiation"],
        );
        context
            .post(
                "termination",
                &callback,
                &negotiation_action_path(&consumer_pid, "termination"),
                &document,
            )
            .map(|_| ())
    })
}

// ── Transfer ────────────────────────────────────────────────────────

/// Starts the transfer with the default pull data address.
pub fn post_start_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let (consumer_pid, callback) = transfer_route(&process)?;
        let document = messages::transfer_start(
            process.id(),
            &consumer_pid,
            Some(messages::default_data_address()),
        );
        let address = context
            .canonicalizer
            .canonicalize(&document)?
            .data_address()
            .map(DataAddress::from_canonical)
            .transpose()?;
        context.system.provider_transfer.started(process.id(), address)?;
        context
            .post(
                "start",
                &callback,
                &transfer_action_path(&consumer_pid, "start"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_complete_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let (consumer_pid, callback) = transfer_route(&process)?;
        context.system.provider_transfer.completed(process.id())?;
        let document = messages::transfer_completion(process.id(), &consumer_pid);
        context
            .post(
                "completion",
                &callback,
                &transfer_action_path(&consumer_pid, "completion"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_suspend_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let (consumer_pid, callback) = transfer_route(&process)?;
        context.system.provider_transfer.suspended(process.id())?;
        let document = messages::transfer_suspension(
            process.id(),
            &consumer_pid,
            "1",
            &["Provider suspended the transfer"],
        );
        context
            .post(
                "suspension",
                &callback,
                &transfer_action_path(&consumer_pid, "suspension"),
                &document,
            )
            .map(|_| ())
    })
}

pub fn post_terminate_transfer(context: ActionContext) -> TransferAction {
    Box::new(move |process: Arc<TransferProcess>| {
        let (consumer_pid, callback) = transfer_route(&process)?;
        context.system.provider_transfer.terminated(process.id())?;
        let document = messages::transfer_termination(
            process.id(),
            &consumer_pid,
            TERMINATION_CODE,
            &["Provider terminated the transfer"],
        );
        context
            .post(
                "termination",
                &callback,
                &transfer_action_path(&consumer_pid, "termination"),
                &document,
            )
            .map(|_| ())
    })
}
