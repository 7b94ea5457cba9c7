//! Negotiation mocks over either negotiation manager.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tck_core::errors::TckError;
use tck_statemachine::{Negotiation, NegotiationState};
use tokio::runtime::Handle;
use tracing::debug;

use super::{
    unexecuted, ActionTable, ConsumerNegotiationMock, NegotiationAction, ProtocolMock,
    ProviderNegotiationMock,
};
use crate::manager::{ListenerId, NegotiationListener, NegotiationManager};

type Table = ActionTable<NegotiationState, Negotiation>;

/// Forwards every negotiation event to the action table under the state
/// it entered.
struct MockListener {
    table: Arc<Table>,
}

impl NegotiationListener for MockListener {
    fn negotiation_created(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Initialized, negotiation);
    }

    fn contract_requested(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Requested, negotiation);
    }

    fn offered(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Offered, negotiation);
    }

    fn accepted(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Accepted, negotiation);
    }

    fn agreed(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Agreed, negotiation);
    }

    fn verified(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Verified, negotiation);
    }

    fn finalized(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Finalized, negotiation);
    }

    fn terminated(&self, negotiation: &Arc<Negotiation>) {
        self.table.fire(NegotiationState::Terminated, negotiation);
    }
}

/// Mock attached to a negotiation manager of the system connector. Serves
/// as the consumer mock over the consumer manager and as the provider mock
/// over the provider manager.
pub struct LocalNegotiationMock {
    manager: Arc<dyn NegotiationManager>,
    table: Arc<Table>,
    listener: Mutex<Option<ListenerId>>,
}

impl LocalNegotiationMock {
    pub fn new(manager: Arc<dyn NegotiationManager>, handle: Handle, pause: Duration) -> Self {
        let table = Arc::new(Table::new(handle, pause));
        let listener = manager.register_listener(Arc::new(MockListener {
            table: table.clone(),
        }));
        Self {
            manager,
            table,
            listener: Mutex::new(Some(listener)),
        }
    }
}

impl ProtocolMock for LocalNegotiationMock {
    fn verify(&self) -> Result<(), TckError> {
        if let Some(id) = self.listener.lock().take() {
            self.manager.deregister_listener(id);
            debug!("negotiation mock detached");
        }
        unexecuted(self.table.pending())
    }

    fn completed(&self) -> bool {
        self.table.pending().is_empty()
    }

    fn reset(&self) {
        self.table.clear();
    }
}

impl ConsumerNegotiationMock for LocalNegotiationMock {
    fn record_initialized_action(&self, action: NegotiationAction) {
        self.table.record(NegotiationState::Initialized, action);
    }

    fn record_offered_action(&self, action: NegotiationAction) {
        self.table.record(NegotiationState::Offered, action);
    }

    fn record_agreed_action(&self, action: NegotiationAction) {
        self.table.record(NegotiationState::Agreed, action);
    }
}

impl ProviderNegotiationMock for LocalNegotiationMock {
    fn record_contract_requested_action(&self, action: NegotiationAction) {
        self.table.record(NegotiationState::Requested, action);
    }

    fn record_accepted_action(&self, action: NegotiationAction) {
        self.table.record(NegotiationState::Accepted, action);
    }

    fn record_verified_action(&self, action: NegotiationAction) {
        self.table.record(NegotiationState::Verified, action);
    }
}

impl Drop for LocalNegotiationMock {
    fn drop(&mut self) {
        if let Some(id) = self.listener.lock().take() {
            self.manager.deregister_listener(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ConsumerNegotiationManager;
    use std::sync::mpsc;
    use tck_core::message::Canonicalizer;

    #[test]
    fn created_negotiation_triggers_initialized_action() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let manager = Arc::new(ConsumerNegotiationManager::new(Arc::new(
            Canonicalizer::dsp().unwrap(),
        )));
        let mock = LocalNegotiationMock::new(
            manager.clone(),
            rt.handle().clone(),
            Duration::from_millis(1),
        );
        let (tx, rx) = mpsc::channel();
        mock.record_initialized_action(Box::new(move |n: Arc<Negotiation>| {
            tx.send(n.id().to_string()).unwrap();
            Ok(())
        }));
        assert!(!mock.completed());

        let negotiation = manager.create_negotiation("dataset", "offer", "provider").unwrap();
        let fired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired, negotiation.id());
        assert!(mock.verify().is_ok());
    }

    #[test]
    fn verify_lists_pending_states_and_detaches() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let manager = Arc::new(ConsumerNegotiationManager::new(Arc::new(
            Canonicalizer::dsp().unwrap(),
        )));
        let mock = LocalNegotiationMock::new(
            manager.clone(),
            rt.handle().clone(),
            Duration::from_millis(1),
        );
        mock.record_agreed_action(Box::new(|_| Ok(())));
        let err = mock.verify().unwrap_err();
        assert!(matches!(err, TckError::Expectation(m) if m.contains("AGREED")));
        assert_eq!(manager.store().listener_count(), 0);
    }
}
