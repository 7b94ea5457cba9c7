//! Contract negotiation managers.
//!
//! On the consumer side our entity id is the consumer pid and the
//! correlation id is the provider pid; on the provider side the reverse.
//! Inbound messages are located accordingly.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tck_core::constants::{EVENT_ACCEPTED, EVENT_FINALIZED, PROPERTY_TARGET_EXPANDED};
use tck_core::errors::TckError;
use tck_core::message::{CanonicalMessage, Canonicalizer};
use tck_core::messages;
use tck_statemachine::negotiation::Amendment;
use tck_statemachine::{Negotiation, NegotiationKind, NegotiationState};
use tracing::debug;

use super::{ListenerId, ListenerSet};

/// Observer of negotiation protocol events. Every method defaults to a no-op.
pub trait NegotiationListener: Send + Sync {
    fn negotiation_created(&self, _negotiation: &Arc<Negotiation>) {}
    fn contract_requested(&self, _negotiation: &Arc<Negotiation>) {}
    fn offered(&self, _negotiation: &Arc<Negotiation>) {}
    fn accepted(&self, _negotiation: &Arc<Negotiation>) {}
    fn agreed(&self, _negotiation: &Arc<Negotiation>) {}
    fn verified(&self, _negotiation: &Arc<Negotiation>) {}
    fn finalized(&self, _negotiation: &Arc<Negotiation>) {}
    fn terminated(&self, _negotiation: &Arc<Negotiation>) {}
}

type NegotiationEvent = fn(&dyn NegotiationListener, &Arc<Negotiation>);

/// Shared storage behind both negotiation managers.
pub struct NegotiationStore {
    kind: NegotiationKind,
    canonicalizer: Arc<Canonicalizer>,
    negotiations: DashMap<String, Arc<Negotiation>>,
    /// Held while an initial request is looked up, created and moved to REQUESTED.
    requests: Mutex<()>,
    listeners: ListenerSet<dyn NegotiationListener>,
}

impl NegotiationStore {
    fn new(kind: NegotiationKind, canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            kind,
            canonicalizer,
            negotiations: DashMap::new(),
            requests: Mutex::new(()),
            listeners: ListenerSet::default(),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Arc<Negotiation>, TckError> {
        self.negotiations
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TckError::NotFound {
                kind: "Negotiation",
                id: id.to_string(),
            })
    }

    /// Linear scan; `None` when no entity carries the correlation id.
    pub fn find_by_correlation_id(&self, correlation_id: &str) -> Option<Arc<Negotiation>> {
        self.negotiations
            .iter()
            .find(|entry| entry.value().correlation_id().as_deref() == Some(correlation_id))
            .map(|entry| entry.value().clone())
    }

    pub fn negotiations(&self) -> Vec<Arc<Negotiation>> {
        self.negotiations
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn canonicalizer(&self) -> &Arc<Canonicalizer> {
        &self.canonicalizer
    }

    fn insert(&self, negotiation: Arc<Negotiation>) {
        self.negotiations
            .insert(negotiation.id().to_string(), negotiation.clone());
        self.listeners
            .notify(|l| l.negotiation_created(&negotiation));
    }

    fn transition(
        &self,
        negotiation: &Arc<Negotiation>,
        to: NegotiationState,
        amendment: Amendment,
        event: NegotiationEvent,
    ) -> Result<(), TckError> {
        let notified = negotiation.clone();
        negotiation.transition_with(to, amendment, |_| {
            self.listeners.notify(|l| event(l, &notified));
        })
    }

    /// Our entity for an inbound message: consumer pid on the consumer
    /// side, provider pid on the provider side.
    fn locate(&self, message: &CanonicalMessage) -> Result<Arc<Negotiation>, TckError> {
        debug!(
            message_type = message.message_type().unwrap_or_default(),
            consumer_pid = message.consumer_pid().unwrap_or_default(),
            provider_pid = message.provider_pid().unwrap_or_default(),
            "inbound negotiation message"
        );
        match self.kind {
            NegotiationKind::Consumer => self.find_by_id(message.consumer_pid()?),
            NegotiationKind::Provider => self.find_by_id(message.provider_pid()?),
        }
    }

    /// Canonical `ContractNegotiation` reflecting the current state.
    pub fn response(&self, negotiation: &Negotiation) -> Result<CanonicalMessage, TckError> {
        let state = negotiation.state();
        let missing = || TckError::MissingCorrelationId(state.to_string());
        let provider_pid = negotiation.provider_pid().ok_or_else(missing)?;
        let consumer_pid = negotiation.consumer_pid().ok_or_else(missing)?;
        self.canonicalizer.canonicalize(&messages::negotiation_response(
            &provider_pid,
            &consumer_pid,
            &state.to_string(),
        ))
    }
}

/// Operations shared by both roles.
pub trait NegotiationManager: Send + Sync {
    fn store(&self) -> &NegotiationStore;

    fn find_by_id(&self, id: &str) -> Result<Arc<Negotiation>, TckError> {
        self.store().find_by_id(id)
    }

    fn find_by_correlation_id(&self, correlation_id: &str) -> Option<Arc<Negotiation>> {
        self.store().find_by_correlation_id(correlation_id)
    }

    fn negotiations(&self) -> Vec<Arc<Negotiation>> {
        self.store().negotiations()
    }

    fn register_listener(&self, listener: Arc<dyn NegotiationListener>) -> ListenerId {
        self.store().listeners.register(listener)
    }

    fn deregister_listener(&self, id: ListenerId) -> bool {
        self.store().listeners.deregister(id)
    }

    /// Local termination.
    fn terminated(&self, id: &str) -> Result<(), TckError> {
        let store = self.store();
        let negotiation = store.find_by_id(id)?;
        store.transition(&negotiation, NegotiationState::Terminated, Amendment::None, |l, n| {
            l.terminated(n)
        })
    }

    fn handle_termination(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        let negotiation = store.locate(message)?;
        store.transition(&negotiation, NegotiationState::Terminated, Amendment::None, |l, n| {
            l.terminated(n)
        })?;
        store.response(&negotiation)
    }

    /// Current state as a canonical `ContractNegotiation`.
    fn get_negotiation(&self, id: &str) -> Result<CanonicalMessage, TckError> {
        let store = self.store();
        store.response(&*store.find_by_id(id)?)
    }
}

// ── Consumer ────────────────────────────────────────────────────────

pub struct ConsumerNegotiationManager {
    store: NegotiationStore,
}

impl NegotiationManager for ConsumerNegotiationManager {
    fn store(&self) -> &NegotiationStore {
        &self.store
    }
}

impl ConsumerNegotiationManager {
    pub fn new(canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            store: NegotiationStore::new(NegotiationKind::Consumer, canonicalizer),
        }
    }

    /// New INITIALIZED negotiation; fires `negotiation_created`.
    pub fn create_negotiation(
        &self,
        dataset_id: &str,
        offer_id: &str,
        counter_party_id: &str,
    ) -> Result<Arc<Negotiation>, TckError> {
        let negotiation = Arc::new(
            Negotiation::builder(NegotiationKind::Consumer)
                .dataset_id(dataset_id)
                .offer_id(offer_id)
                .counter_party_id(counter_party_id)
                .build()?,
        );
        self.store.insert(negotiation.clone());
        Ok(negotiation)
    }

    /// Request sent and acknowledged: records the provider pid and moves to REQUESTED.
    pub fn contract_requested(&self, consumer_pid: &str, provider_pid: &str) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(consumer_pid)?;
        self.store.transition(
            &negotiation,
            NegotiationState::Requested,
            Amendment::CorrelationId(provider_pid.to_string()),
            |l, n| l.contract_requested(n),
        )
    }

    /// Counter-request on an offered negotiation.
    pub fn counter_requested(&self, consumer_pid: &str, offer: CanonicalMessage) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(consumer_pid)?;
        self.store.transition(
            &negotiation,
            NegotiationState::Requested,
            Amendment::Offer(offer),
            |l, n| l.contract_requested(n),
        )
    }

    /// Inbound `ContractOfferMessage`.
    pub fn handle_offer(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let negotiation = self.store.locate(message)?;
        let amendment = Amendment::OfferFrom {
            offer: message.offer()?.clone(),
            correlation_id: message.provider_pid()?.to_string(),
        };
        self.store.transition(
            &negotiation,
            NegotiationState::Offered,
            amendment,
            |l, n| l.offered(n),
        )?;
        self.store.response(&negotiation)
    }

    pub fn accepted(&self, consumer_pid: &str) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(consumer_pid)?;
        self.store.transition(&negotiation, NegotiationState::Accepted, Amendment::None, |l, n| {
            l.accepted(n)
        })
    }

    /// Inbound `ContractAgreementMessage`.
    pub fn handle_agreement(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let negotiation = self.store.locate(message)?;
        let agreement = message.agreement()?.clone();
        self.store.transition(
            &negotiation,
            NegotiationState::Agreed,
            Amendment::Agreement(agreement),
            |l, n| l.agreed(n),
        )?;
        self.store.response(&negotiation)
    }

    pub fn verified(&self, consumer_pid: &str) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(consumer_pid)?;
        self.store.transition(&negotiation, NegotiationState::Verified, Amendment::None, |l, n| {
            l.verified(n)
        })
    }

    /// Inbound FINALIZED `ContractNegotiationEventMessage`.
    pub fn handle_finalized(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        expect_event(message, EVENT_FINALIZED)?;
        let negotiation = self.store.locate(message)?;
        self.store.transition(&negotiation, NegotiationState::Finalized, Amendment::None, |l, n| {
            l.finalized(n)
        })?;
        self.store.response(&negotiation)
    }
}

// ── Provider ────────────────────────────────────────────────────────

pub struct ProviderNegotiationManager {
    store: NegotiationStore,
}

impl NegotiationManager for ProviderNegotiationManager {
    fn store(&self) -> &NegotiationStore {
        &self.store
    }
}

impl ProviderNegotiationManager {
    pub fn new(canonicalizer: Arc<Canonicalizer>) -> Self {
        Self {
            store: NegotiationStore::new(NegotiationKind::Provider, canonicalizer),
        }
    }

    /// Inbound `ContractRequestMessage`.
    ///
    /// # Contract
    /// - With a provider pid: counter-request on that negotiation (OFFERED → REQUESTED).
    /// - Without: initial request. A resend carrying a known consumer pid
    ///   answers the existing negotiation's response and creates nothing.
    /// - A new negotiation starts INITIALIZED and moves to REQUESTED.
    pub fn handle_contract_request(
        &self,
        message: &CanonicalMessage,
        counter_party_id: &str,
    ) -> Result<CanonicalMessage, TckError> {
        let offer = message.offer()?.clone();
        if message.provider_pid().is_ok() {
            let negotiation = self.store.locate(message)?;
            self.store.transition(
                &negotiation,
                NegotiationState::Requested,
                Amendment::Offer(offer),
                |l, n| l.contract_requested(n),
            )?;
            return self.store.response(&negotiation);
        }

        let consumer_pid = message.consumer_pid()?;
        debug!(consumer_pid, "inbound contract request");
        let _request = self.store.requests.lock();
        if let Some(existing) = self.store.find_by_correlation_id(consumer_pid) {
            debug!(id = existing.id(), consumer_pid, "contract request resent");
            return self.store.response(&existing);
        }

        let offer_id = offer
            .id()
            .ok_or_else(|| TckError::ValidationFailure("Offer has no @id".to_string()))?
            .to_string();
        let dataset_id = offer.id_property(PROPERTY_TARGET_EXPANDED)?.to_string();
        let negotiation = Arc::new(
            Negotiation::builder(NegotiationKind::Provider)
                .correlation_id(consumer_pid)
                .offer_id(offer_id)
                .dataset_id(dataset_id)
                .counter_party_id(counter_party_id)
                .callback_address(message.callback_address()?)
                .offer(offer)
                .build()?,
        );
        self.store.insert(negotiation.clone());
        self.store.transition(
            &negotiation,
            NegotiationState::Requested,
            Amendment::None,
            |l, n| l.contract_requested(n),
        )?;
        self.store.response(&negotiation)
    }

    /// (Counter-)offer sent.
    pub fn offered(&self, provider_pid: &str, offer: CanonicalMessage) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(provider_pid)?;
        self.store.transition(
            &negotiation,
            NegotiationState::Offered,
            Amendment::Offer(offer),
            |l, n| l.offered(n),
        )
    }

    /// Agreement sent.
    pub fn agreed(&self, provider_pid: &str, agreement: CanonicalMessage) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(provider_pid)?;
        self.store.transition(
            &negotiation,
            NegotiationState::Agreed,
            Amendment::Agreement(agreement),
            |l, n| l.agreed(n),
        )
    }

    /// Inbound ACCEPTED `ContractNegotiationEventMessage`.
    pub fn handle_accepted(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        expect_event(message, EVENT_ACCEPTED)?;
        let negotiation = self.store.locate(message)?;
        self.store.transition(&negotiation, NegotiationState::Accepted, Amendment::None, |l, n| {
            l.accepted(n)
        })?;
        self.store.response(&negotiation)
    }

    /// Inbound `ContractAgreementVerificationMessage`.
    pub fn handle_verified(&self, message: &CanonicalMessage) -> Result<CanonicalMessage, TckError> {
        let negotiation = self.store.locate(message)?;
        self.store.transition(&negotiation, NegotiationState::Verified, Amendment::None, |l, n| {
            l.verified(n)
        })?;
        self.store.response(&negotiation)
    }

    pub fn finalized(&self, provider_pid: &str) -> Result<(), TckError> {
        let negotiation = self.store.find_by_id(provider_pid)?;
        self.store.transition(&negotiation, NegotiationState::Finalized, Amendment::None, |l, n| {
            l.finalized(n)
        })
    }
}

fn expect_event(message: &CanonicalMessage, expected: &str) -> Result<(), TckError> {
    let event = message.event_type()?;
    if event == expected {
        Ok(())
    } else {
        Err(TckError::ValidationFailure(format!(
            "Unexpected negotiation event: {event}, expected {expected}"
        )))
    }
}
