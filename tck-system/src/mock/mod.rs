//! Scripted counter-party behaviour.
//!
//! A mock listens to one of the system connector's managers and, for each
//! protocol event, pops the next action recorded for the entity's new
//! state and runs it on the runtime's blocking pool after a short pause.
//! Actions are FIFO per state: the second `requested` notification runs
//! the second recorded `requested` action.
//!
//! In networked mode the system under test reacts on its own, so the
//! runtime hands out [`NoOpMock`] instead.

mod negotiation;
mod transfer;

pub use negotiation::LocalNegotiationMock;
pub use transfer::LocalTransferProcessMock;

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tck_core::errors::TckError;
use tck_statemachine::{Negotiation, TransferProcess};
use tokio::runtime::Handle;
use tracing::{debug, error};

/// A deferred reaction to a state change, run off the notifying thread.
pub type MockAction<T> = Box<dyn FnOnce(Arc<T>) -> Result<(), TckError> + Send>;

pub type NegotiationAction = MockAction<Negotiation>;

pub type TransferAction = MockAction<TransferProcess>;

/// Lifecycle shared by every mock.
pub trait ProtocolMock: Send + Sync {
    /// Fails with `Expectation` when recorded actions never ran, then
    /// detaches the mock from its manager.
    fn verify(&self) -> Result<(), TckError>;

    /// `true` once every recorded action has been taken.
    fn completed(&self) -> bool;

    /// Drops every pending action.
    fn reset(&self);
}

/// Reactions of a consumer to negotiation events.
pub trait ConsumerNegotiationMock: ProtocolMock {
    fn record_initialized_action(&self, action: NegotiationAction);

    fn record_offered_action(&self, action: NegotiationAction);

    fn record_agreed_action(&self, action: NegotiationAction);
}

/// Reactions of a provider to negotiation events.
pub trait ProviderNegotiationMock: ProtocolMock {
    fn record_contract_requested_action(&self, action: NegotiationAction);

    fn record_accepted_action(&self, action: NegotiationAction);

    fn record_verified_action(&self, action: NegotiationAction);
}

pub trait ConsumerTransferProcessMock: ProtocolMock {
    fn record_initialized_action(&self, action: TransferAction);

    fn record_started_action(&self, action: TransferAction);
}

pub trait ProviderTransferProcessMock: ProtocolMock {
    fn record_requested_action(&self, action: TransferAction);

    fn record_started_action(&self, action: TransferAction);
}

// ── Action table ────────────────────────────────────────────────────

/// Per-state FIFO queues of pending actions.
pub(crate) struct ActionTable<S, T> {
    actions: Mutex<HashMap<S, VecDeque<MockAction<T>>>>,
    handle: Handle,
    pause: Duration,
}

impl<S, T> ActionTable<S, T>
where
    S: Copy + Eq + Hash + Display + Send + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new(handle: Handle, pause: Duration) -> Self {
        Self {
            actions: Mutex::new(HashMap::new()),
            handle,
            pause,
        }
    }

    pub(crate) fn record(&self, state: S, action: MockAction<T>) {
        self.actions.lock().entry(state).or_default().push_back(action);
    }

    /// Runs the next action recorded for `state`, if any, on the blocking pool.
    pub(crate) fn fire(&self, state: S, entity: &Arc<T>) {
        let action = self
            .actions
            .lock()
            .get_mut(&state)
            .and_then(VecDeque::pop_front);
        let Some(action) = action else {
            debug!(state = %state, "no mock action recorded");
            return;
        };
        let entity = entity.clone();
        let pause = self.pause;
        self.handle.spawn_blocking(move || {
            thread::sleep(pause);
            if let Err(e) = action(entity) {
                error!(state = %state, error = %e, "mock action failed");
            }
        });
    }

    /// States that still hold actions, in no particular order.
    pub(crate) fn pending(&self) -> Vec<String> {
        self.actions
            .lock()
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(state, queue)| format!("{state} ({})", queue.len()))
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.actions.lock().clear();
    }
}

pub(crate) fn unexecuted(pending: Vec<String>) -> Result<(), TckError> {
    if pending.is_empty() {
        Ok(())
    } else {
        Err(TckError::Expectation(format!(
            "Request actions not executed.\n Actions: {}",
            pending.join(", ")
        )))
    }
}

// ── No-op ───────────────────────────────────────────────────────────

/// Mock used when the system under test is networked. Recording is
/// ignored and verification always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMock;

impl ProtocolMock for NoOpMock {
    fn verify(&self) -> Result<(), TckError> {
        Ok(())
    }

    fn completed(&self) -> bool {
        true
    }

    fn reset(&self) {}
}

impl ConsumerNegotiationMock for NoOpMock {
    fn record_initialized_action(&self, _action: NegotiationAction) {}

    fn record_offered_action(&self, _action: NegotiationAction) {}

    fn record_agreed_action(&self, _action: NegotiationAction) {}
}

impl ProviderNegotiationMock for NoOpMock {
    fn record_contract_requested_action(&self, _action: NegotiationAction) {}

    fn record_accepted_action(&self, _action: NegotiationAction) {}

    fn record_verified_action(&self, _action: NegotiationAction) {}
}

impl ConsumerTransferProcessMock for NoOpMock {
    fn record_initialized_action(&self, _action: TransferAction) {}

    fn record_started_action(&self, _action: TransferAction) {}
}

impl ProviderTransferProcessMock for NoOpMock {
    fn record_requested_action(&self, _action: TransferAction) {}

    fn record_started_action(&self, _action: TransferAction) {}
}
