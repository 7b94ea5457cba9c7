//! Entity registries and protocol-event handling.
//!
//! A manager owns the entities of one role, looks them up by id or by
//! correlation id, applies inbound protocol messages as FSM transitions and
//! fans each event out to its listeners.
//!
//! Listener fan-out happens inside the transition side effect, so listeners
//! run while the entity lock is held in read mode. Listeners must not
//! transition the notifying entity from the notifying thread; mocks hand
//! their reaction to the executor instead.

pub mod negotiation;
pub mod transfer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

pub use negotiation::{
    ConsumerNegotiationManager, NegotiationListener, NegotiationManager, NegotiationStore,
    ProviderNegotiationManager,
};
pub use transfer::{
    ConsumerTransferProcessManager, ProviderTransferProcessManager, TransferManager,
    TransferProcessListener, TransferStore,
};

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Append/remove-safe listener collection. Notification iterates a snapshot,
/// so listeners may (de)register during fan-out.
pub struct ListenerSet<L: ?Sized> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn register(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: impl Fn(&L)) {
        let snapshot: Vec<Arc<L>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            event(&listener);
        }
    }
}
