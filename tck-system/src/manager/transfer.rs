//! Transfer process managers.
//!
//! Mirrors [`super::negotiation`]: the consumer locates inbound messages by
//! consumer pid, the provider by provider pid.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tck_core::errors::TckError;
use tck_core::message::{CanonicalMessage, Canonicalizer};
use tck_core::messages;
use tck_statemachine::transfer::Amendment;
use tck_statemachine::{DataAddress, TransferKind, TransferProcess, TransferState};
use tracing::debug;

use super::{ListenerId, ListenerSet};

/// Observer of transfer protocol events. Every method defaults to a no-op.
pub trait TransferProcessListener: Send + Sync {
    fn transfer_initialized(&self, _process: &Arc<TransferProcess>) {}
    fn requested(&self, _process: &Arc<TransferProcess>) {}
    fn started(&self, _process: &Arc<TransferProcess>) {}
    fn completed(&self, _process: &Arc<TransferProcess>) {}
    fn suspended(&self, _process: &Arc<TransferProcess>) {}
    fn terminated(&self, _process: &Arc<TransferProcess>) {}
}

type TransferEvent = fn(&dyn TransferProcessListener, &Arc<TransferProcess>);

pub struct TransferStore {
    kind: TransferKind,
    canonicalizer: Arc<Canonicalizer>,
    processes: DashMap<String, Arc<TransferProcess>>,
    /// Held while an initial request is looked up, created and moved to REQUESTED.
    requests: Mutex<()>,
    listeners: ListenerSet<dyn TransferProcessListener>,
}

impl TransferStore {
    fn new(kind: TransferKind, canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            kind,
            canonicalizer,
            processes: DashMap::new(),
            requests: Mutex::new(()),
            listeners: ListenerSet::default(),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Arc<TransferProcess>, TckError> {
        self.processes
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TckError::NotFound {
                kind: "Transfer process",
                id: id.to_string(),
            })
    }

    pub fn find_by_correlation_id(&self, correlation_id: &str) -> Option<Arc<TransferProcess>> {
        self.processes
            .iter()
            .find(|entry| entry.value().correlation_id().as_deref() == Some(correlation_id))
            .map(|entry| entry.value().clone())
    }

    pub fn processes(&self) -> Vec<Arc<TransferProcess>> {
        self.processes
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn insert(&self, process: Arc<TransferProcess>) {
        self.processes
            .insert(process.id().to_string(), process.clone());
        self.listeners.notify(|l| l.transfer_initialized(&process));
    }

    fn transition(
        &self,
        process: &Arc<TransferProcess>,
        to: TransferState,
        amendment: Amendment,
        event: TransferEvent,
    ) -> Result<(), TckError> {
        let notified = process.clone();
        process.transition_with(to, amendment, |_| {
            self.listeners.notify(|l| event(l, &notified));
        })
    }

    fn locate(&self, message: &CanonicalMessage) -> Result<Arc<TransferProcess>, TckError> {
        debug!(
            message_type = message.message_type().unwrap_or_default(),
            consumer_pid = message.consumer_pid().unwrap_or_default(),
            provider_pid = message.provider_pid().unwrap_or_default(),
            "inbound transfer message"
        );
        match self.kind {
            TransferKind::Consumer => self.find_by_id(message.consumer_pid()?),
            TransferKind::Provider => self.find_by_id(message.provider_pid()?),
        }
    }

    /// Canonical `TransferProcess` reflecting the current state.
    pub fn response(&self, process: &TransferProcess) -> Result<CanonicalMessage, TckError> {
        let state = process.state();
        let missing = || TckError::MissingCorrelationId(state.to_string());
        let provider_pid = process.provider_pid().ok_or_else(missing)?;
        let consumer_pid = process.consumer_pid().ok_or_else(missing)?;
        self.canonicalizer.canonicalize(&messages::transfer_response(
            &provider_pid,
            &consumer_pid,
            &state.to_string(),
        ))
    }
}

/// Operations shared by both roles.
pub trait TransferManager: Send + Sync {
    fn store(&self) -> &TransferStore;

    fn find_by_id(&self, id: &str) -> Result<Arc<TransferProcess>, TckError> {
        self.store().find_by_id(id)
    }

    fn find_by_correlation_id(&self, correlation_id: &str) -> Option<Arc<TransferProcess>> {
        self.store().find_by_correlation_id(correlation_id)
    }

    fn processes(&self) -> Vec<Arc<TransferProcess>> {
        self.store().processes()
    }

    fn register_listener(&self, listener: Arc<dyn TransferProcessListener>) -> ListenerId {
        self.store().listeners.register(listener)
    }

    fn deregister_listener(&self, id: ListenerId) -> bool {
        self.store().listeners.deregister(id)
    }

    /// Inbound `TransferStartMessage`, accepting any data address.
    fn handle_start(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        self.handle_start_with(message, &|_| true)
    }

    /// Inbound `TransferStartMessage`.
    ///
    /// # Contract
    /// - `accept` sees the data address carried by the message, if any.
    /// - A rejected address fails with `ValidationFailure` before any mutation.
    /// - A missing correlation id is taken from the message.
    fn handle_start_with(
        &self,
        message: &CanonicalMessage,
        accept: &dyn Fn(Option<&DataAddress>) -> bool,
    ) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        let process = store.locate(message)?;
        let data_address = message
            .data_address()
            .map(DataAddress::from_canonical)
            .transpose()?;
        if !accept(data_address.as_ref()) {
            return Err(TckError::ValidationFailure(format!(
                "Data address rejected for transfer process {}",
                process.id()
            )));
        }
        let correlation_id = match process.kind() {
            TransferKind::Consumer => message.provider_pid()?,
            TransferKind::Provider => message.consumer_pid()?,
        };
        let amendment = Amendment::Start {
            correlation_id: correlation_id.to_string(),
            data_address,
        };
        store.transition(&process, TransferState::Started, amendment, |l, p| l.started(p))?;
        store.response(&process)
    }

    fn handle_completion(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        let process = store.locate(message)?;
        store.transition(&process, TransferState::Completed, Amendment::None, |l, p| {
            l.completed(p)
        })?;
        store.response(&process)
    }

    fn handle_suspension(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        let process = store.locate(message)?;
        store.transition(&process, TransferState::Suspended, Amendment::None, |l, p| {
            l.suspended(p)
        })?;
        store.response(&process)
    }

    fn handle_termination(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        let process = store.locate(message)?;
        store.transition(&process, TransferState::Terminated, Amendment::None, |l, p| {
            l.terminated(p)
        })?;
        store.response(&process)
    }

    /// Local start, optionally handing over a data address.
    fn started(&self, id: &str, data_address: Option<DataAddress>) -> Result<(), TckError> {
        let store = self.store();
        let process = store.find_by_id(id)?;
        let amendment = data_address.map_or(Amendment::None, Amendment::DataAddress);
        store.transition(&process, TransferState::Started, amendment, |l, p| l.started(p))
    }

    fn completed(&self, id: &str) -> Result<(), TckError> {
        let store = self.store();
        let process = store.find_by_id(id)?;
        store.transition(&process, TransferState::Completed, Amendment::None, |l, p| {
            l.completed(p)
        })
    }

    fn suspended(&self, id: &str) -> Result<(), TckError> {
        let store = self.store();
        let process = store.find_by_id(id)?;
        store.transition(&process, TransferState::Suspended, Amendment::None, |l, p| {
            l.suspended(p)
        })
    }

    fn terminated(&self, id: &str) -> Result<(), TckError> {
        let store = self.store();
        let process = store.find_by_id(id)?;
        store.transition(&process, TransferState::Terminated, Amendment::None, |l, p| {
            l.terminated(p)
        })
    }

    /// Current state as a canonical `TransferProcess`.
    fn get_transfer_process(&self, id: &str) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        store.response(&*store.find_by_id(id)?)
    }
}

// ── Consumer ────────────────────────────────────────────────────────

pub struct ConsumerTransferProcessManager {
    store: TransferStore,
}

impl TransferManager for ConsumerTransferProcessManager {
    fn store(&self) -> &TransferStore {
        &self.store
    }
}

impl ConsumerTransferProcessManager {
    pub fn new(canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            store: TransferStore::new(TransferKind::Consumer, canonicalizer),
        }
    }

    /// New INITIALIZED transfer process; fires `transfer_initialized`.
    pub fn create_transfer_process(
        &self,
        agreement_id: &str,
        format: &str,
        data_address: Option<DataAddress>,
    ) -> Result<Arc<TransferProcess>, TckError> {
        let mut builder = TransferProcess::builder(TransferKind::Consumer)
            .agreement_id(agreement_id)
            .format(format);
        if let Some(address) = data_address {
            builder = builder.data_address(address);
        }
        let process = Arc::new(builder.build()?);
        self.store.insert(process.clone());
        Ok(process)
    }

    /// Request acknowledged: records the provider pid and moves to REQUESTED.
    pub fn transfer_requested(&self, consumer_pid: &str, provider_pid: &str) -> Result<(), TckError> {
        let process = self.store.find_by_id(consumer_pid)?;
        self.store.transition(
            &process,
            TransferState::Requested,
            Amendment::CorrelationId(provider_pid.to_string()),
            |l, p| l.requested(p),
        )
    }
}

// ── Provider ────────────────────────────────────────────────────────

pub struct ProviderTransferProcessManager {
    store: TransferStore,
}

impl TransferManager for ProviderTransferProcessManager {
    fn store(&self) -> &TransferStore {
        &self.store
    }
}

impl ProviderTransferProcessManager {
    pub fn new(canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            store: TransferStore::new(TransferKind::Provider, canonicalizer),
        }
    }

    /// Inbound `TransferRequestMessage`.
    ///
    /// # Contract
    /// - A resend carrying a known consumer pid answers the existing
    ///   process's response and creates nothing.
    /// - A new process starts INITIALIZED and moves to REQUESTED.
    pub fn handle_transfer_request(
        &self,
        message: &CanonicalMessage,
        counter_party_id: &str,
    ) -> Result<CanonicalMessage, TckError> {
        let consumer_pid = message.consumer_pid()?;
        debug!(consumer_pid, "inbound transfer request");
        let _request = self.store.requests.lock();
        if let Some(existing) = self.store.find_by_correlation_id(consumer_pid) {
            debug!(id = existing.id(), consumer_pid, "transfer request resent");
            return self.store.response(&existing);
        }

        let mut builder = TransferProcess::builder(TransferKind::Provider)
            .correlation_id(consumer_pid)
            .agreement_id(message.agreement_id()?)
            .format(message.format()?)
            .counter_party_id(counter_party_id)
            .callback_address(message.callback_address()?);
        if let Some(node) = message.data_address() {
            builder = builder.data_address(DataAddress::from_canonical(node)?);
        }
        let process = Arc::new(builder.build()?);
        self.store.insert(process.clone());
        self.store
            .transition(&process, TransferState::Requested, Amendment::None, |l, p| {
                l.requested(p)
            })?;
        self.store.response(&process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tck_core::constants::HTTP_ENDPOINT_TYPE;

    fn canonicalizer() -> Arc<Canonicalizer> {
        Arc::new(Canonicalizer::dsp().unwrap())
    }

    fn request(c: &Canonicalizer, consumer_pid: &str) -> CanonicalMessage {
        c.canonicalize(&messages::transfer_request(
            consumer_pid,
            "agreement-1",
            "HTTP-PULL",
            None,
            "http://consumer.example.com",
        ))
        .unwrap()
    }

    #[test]
    fn concurrent_resends_create_one_process() {
        let c = canonicalizer();
        let manager = ProviderTransferProcessManager::new(c.clone());
        let message = request(&c, "c-1");
        let states: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| manager.handle_transfer_request(&message, "C").unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().state_name().unwrap().to_string())
                .collect()
        });
        assert_eq!(manager.processes().len(), 1);
        assert!(states.iter().all(|state| state == "REQUESTED"));
    }

    #[test]
    fn transfer_request_is_idempotent() {
        let c = canonicalizer();
        let manager = ProviderTransferProcessManager::new(c.clone());
        let first = manager.handle_transfer_request(&request(&c, "c-1"), "C").unwrap();
        let second = manager.handle_transfer_request(&request(&c, "c-1"), "C").unwrap();

        assert_eq!(first.state_name().unwrap(), "REQUESTED");
        assert_eq!(first.provider_pid().unwrap(), second.provider_pid().unwrap());
        assert_eq!(first.state().unwrap(), second.state().unwrap());
        assert_eq!(manager.processes().len(), 1);

        let process = manager.find_by_correlation_id("c-1").unwrap();
        assert_eq!(process.agreement_id(), "agreement-1");
        assert_eq!(process.format(), "HTTP-PULL");
    }

    #[test]
    fn missing_id_is_not_found() {
        let manager = ConsumerTransferProcessManager::new(canonicalizer());
        assert!(matches!(
            manager.find_by_id("missing"),
            Err(TckError::NotFound { kind: "Transfer process", .. })
        ));
    }

    #[test]
    fn rejected_data_address_leaves_state_untouched() {
        let c = canonicalizer();
        let manager = ConsumerTransferProcessManager::new(c.clone());
        let process = manager.create_transfer_process("a-1", "HTTP-PUSH", None).unwrap();
        manager.transfer_requested(process.id(), "p-1").unwrap();

        let start = c
            .canonicalize(&messages::transfer_start(
                "p-1",
                process.id(),
                Some(messages::data_address(HTTP_ENDPOINT_TYPE, "http://rejected.example.com", &[])),
            ))
            .unwrap();
        let result = manager.handle_start_with(&start, &|address| {
            address.is_some_and(|a| a.endpoint != "http://rejected.example.com")
        });
        assert!(matches!(result, Err(TckError::ValidationFailure(_))));
        assert_eq!(process.state(), TransferState::Requested);
        assert!(process.data_address().is_none());
    }

    #[test]
    fn consumer_start_records_data_address() {
        let c = canonicalizer();
        let manager = ConsumerTransferProcessManager::new(c.clone());
        let process = manager.create_transfer_process("a-1", "HTTP-PULL", None).unwrap();
        manager.transfer_requested(process.id(), "p-1").unwrap();

        let start = c
            .canonicalize(&messages::transfer_start(
                "p-1",
                process.id(),
                Some(messages::data_address(
                    HTTP_ENDPOINT_TYPE,
                    "http://data.example.com",
                    &[("authorization", "token")],
                )),
            ))
            .unwrap();
        let response = manager.handle_start(&start).unwrap();
        assert_eq!(response.state_name().unwrap(), "STARTED");

        let address = process.data_address().unwrap();
        assert_eq!(address.endpoint, "http://data.example.com");
        assert_eq!(address.endpoint_properties["authorization"], "token");
    }

    #[test]
    fn provider_lifecycle_through_suspension() {
        let c = canonicalizer();
        let manager = ProviderTransferProcessManager::new(c.clone());
        let response = manager.handle_transfer_request(&request(&c, "c-2"), "C").unwrap();
        let id = response.provider_pid().unwrap().to_string();

        manager.started(&id, None).unwrap();
        manager.suspended(&id).unwrap();
        let restart = c
            .canonicalize(&messages::transfer_start(&id, "c-2", None))
            .unwrap();
        assert_eq!(manager.handle_start(&restart).unwrap().state_name().unwrap(), "STARTED");
        manager.completed(&id).unwrap();
        assert_eq!(
            manager.get_transfer_process(&id).unwrap().state_name().unwrap(),
            "COMPLETED"
        );

        let termination = c
            .canonicalize(&messages::transfer_termination(&id, "c-2", "1", &["late"]))
            .unwrap();
        assert!(matches!(
            manager.handle_termination(&termination),
            Err(TckError::IllegalTransition { .. })
        ));
    }
}
