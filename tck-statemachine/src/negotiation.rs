//! Contract negotiation entity.
//!
//! ## State table
//!
//! | From | To |
//! |------|----|
//! | INITIALIZED | REQUESTED, OFFERED, TERMINATED |
//! | REQUESTED | OFFERED, AGREED, TERMINATED |
//! | OFFERED | REQUESTED, OFFERED, ACCEPTED, TERMINATED |
//! | ACCEPTED | AGREED, TERMINATED |
//! | AGREED | VERIFIED, TERMINATED |
//! | VERIFIED | FINALIZED, TERMINATED |
//! | FINALIZED, TERMINATED | (terminal) |
//!
//! Leaving INITIALIZED for REQUESTED or OFFERED requires the correlation id.
//!
//! ## Locking
//!
//! Mutable data sits behind one `parking_lot::RwLock` per entity. A
//! transition takes the write lock, validates, mutates, then downgrades to a
//! read guard and runs the side effect and the observers. Observers can read
//! the entity (getters use recursive read locks) but must not transition it
//! from the notifying thread.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use tck_core::errors::TckError;
use tck_core::message::CanonicalMessage;
use tracing::debug;
use uuid::Uuid;

use crate::fsm::{validate_transition, ProtocolState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Initialized,
    Requested,
    Offered,
    Accepted,
    Agreed,
    Verified,
    Finalized,
    Terminated,
}

use NegotiationState::*;

impl ProtocolState for NegotiationState {
    const ALL: &'static [Self] = &[
        Initialized,
        Requested,
        Offered,
        Accepted,
        Agreed,
        Verified,
        Finalized,
        Terminated,
    ];

    fn allowed_targets(self) -> &'static [Self] {
        match self {
            Initialized => &[Requested, Offered, Terminated],
            Requested => &[Offered, Agreed, Terminated],
            Offered => &[Requested, Offered, Accepted, Terminated],
            Accepted => &[Agreed, Terminated],
            Agreed => &[Verified, Terminated],
            Verified => &[Finalized, Terminated],
            Finalized | Terminated => &[],
        }
    }

    fn requires_correlation(from: Self, to: Self) -> bool {
        from == Initialized && matches!(to, Requested | Offered)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Initialized => "INITIALIZED",
            Requested => "REQUESTED",
            Offered => "OFFERED",
            Accepted => "ACCEPTED",
            Agreed => "AGREED",
            Verified => "VERIFIED",
            Finalized => "FINALIZED",
            Terminated => "TERMINATED",
        })
    }
}

/// Which side of the negotiation this entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationKind {
    Consumer,
    Provider,
}

/// Data written together with a transition, under the same write lock.
#[derive(Debug, Clone, Default)]
pub enum Amendment {
    #[default]
    None,
    CorrelationId(String),
    Offer(CanonicalMessage),
    /// An offer plus the sender's pid, recorded as the correlation id when
    /// none is set yet.
    OfferFrom {
        offer: CanonicalMessage,
        correlation_id: String,
    },
    Agreement(CanonicalMessage),
}

impl Amendment {
    fn supplies_correlation_id(&self) -> bool {
        matches!(self, Amendment::CorrelationId(_) | Amendment::OfferFrom { .. })
    }
}

/// Observer invoked after every transition with the previous state.
pub type NegotiationObserver = Arc<dyn Fn(&Negotiation, NegotiationState) + Send + Sync>;

#[derive(Debug)]
struct NegotiationData {
    state: NegotiationState,
    correlation_id: Option<String>,
    offers: Vec<CanonicalMessage>,
    agreement: Option<CanonicalMessage>,
}

/// A contract negotiation from one party's point of view.
pub struct Negotiation {
    id: String,
    kind: NegotiationKind,
    offer_id: String,
    dataset_id: String,
    counter_party_id: String,
    callback_address: Option<String>,
    observers: Vec<NegotiationObserver>,
    data: RwLock<NegotiationData>,
}

impl fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read_recursive();
        f.debug_struct("Negotiation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &data.state)
            .field("correlation_id", &data.correlation_id)
            .field("dataset_id", &self.dataset_id)
            .finish_non_exhaustive()
    }
}

impl Negotiation {
    pub fn builder(kind: NegotiationKind) -> NegotiationBuilder {
        NegotiationBuilder::new(kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NegotiationKind {
        self.kind
    }

    pub fn offer_id(&self) -> &str {
        &self.offer_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn counter_party_id(&self) -> &str {
        &self.counter_party_id
    }

    /// Counter-party callback address, without a trailing slash.
    pub fn callback_address(&self) -> Option<&str> {
        self.callback_address.as_deref()
    }

    pub fn state(&self) -> NegotiationState {
        self.data.read_recursive().state
    }

    pub fn correlation_id(&self) -> Option<String> {
        self.data.read_recursive().correlation_id.clone()
    }

    /// Consumer process id: our id on the consumer side, the correlation id otherwise.
    pub fn consumer_pid(&self) -> Option<String> {
        match self.kind {
            NegotiationKind::Consumer => Some(self.id.clone()),
            NegotiationKind::Provider => self.correlation_id(),
        }
    }

    /// Provider process id: our id on the provider side, the correlation id otherwise.
    pub fn provider_pid(&self) -> Option<String> {
        match self.kind {
            NegotiationKind::Provider => Some(self.id.clone()),
            NegotiationKind::Consumer => self.correlation_id(),
        }
    }

    pub fn offers(&self) -> Vec<CanonicalMessage> {
        self.data.read_recursive().offers.clone()
    }

    pub fn last_offer(&self) -> Option<CanonicalMessage> {
        self.data.read_recursive().offers.last().cloned()
    }

    pub fn agreement(&self) -> Option<CanonicalMessage> {
        self.data.read_recursive().agreement.clone()
    }

    pub fn transition(&self, to: NegotiationState) -> Result<(), TckError> {
        self.transition_with(to, Amendment::None, |_| {})
    }

    /// Validates and performs `state → to`.
    ///
    /// # Contract
    /// - The amendment is applied only when the transition is legal; a
    ///   correlation-id amendment counts toward the correlation precondition.
    /// - On failure nothing changes.
    /// - `side_effect`, then every observer, runs after the state change while
    ///   the entity's lock is still held in read mode.
    pub fn transition_with<F>(
        &self,
        to: NegotiationState,
        amendment: Amendment,
        side_effect: F,
    ) -> Result<(), TckError>
    where
        F: FnOnce(&Negotiation),
    {
        let mut data = self.data.write();
        let from = data.state;
        let correlation_set = data.correlation_id.is_some() || amendment.supplies_correlation_id();
        validate_transition(from, to, correlation_set)?;

        match amendment {
            Amendment::None => {}
            Amendment::CorrelationId(id) => data.correlation_id = Some(id),
            Amendment::Offer(offer) => data.offers.push(offer),
            Amendment::OfferFrom {
                offer,
                correlation_id,
            } => {
                if data.correlation_id.is_none() {
                    data.correlation_id = Some(correlation_id);
                }
                data.offers.push(offer);
            }
            Amendment::Agreement(agreement) => data.agreement = Some(agreement),
        }
        data.state = to;

        let _guard = RwLockWriteGuard::downgrade(data);
        debug!(id = %self.id, from = %from, to = %to, "negotiation transitioned");
        side_effect(self);
        for observer in &self.observers {
            observer(self, from);
        }
        Ok(())
    }
}

/// Builder for [`Negotiation`].
pub struct NegotiationBuilder {
    kind: NegotiationKind,
    id: Option<String>,
    state: NegotiationState,
    correlation_id: Option<String>,
    offer_id: Option<String>,
    dataset_id: Option<String>,
    counter_party_id: Option<String>,
    callback_address: Option<String>,
    offers: Vec<CanonicalMessage>,
    observers: Vec<NegotiationObserver>,
}

impl NegotiationBuilder {
    fn new(kind: NegotiationKind) -> Self {
        Self {
            kind,
            id: None,
            state: Initialized,
            correlation_id: None,
            offer_id: None,
            dataset_id: None,
            counter_party_id: None,
            callback_address: None,
            offers: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Defaults to a fresh UUID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Defaults to INITIALIZED.
    pub fn state(mut self, state: NegotiationState) -> Self {
        self.state = state;
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn offer_id(mut self, offer_id: impl Into<String>) -> Self {
        self.offer_id = Some(offer_id.into());
        self
    }

    pub fn dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn counter_party_id(mut self, counter_party_id: impl Into<String>) -> Self {
        self.counter_party_id = Some(counter_party_id.into());
        self
    }

    pub fn callback_address(mut self, callback_address: impl Into<String>) -> Self {
        self.callback_address = Some(callback_address.into());
        self
    }

    pub fn offer(mut self, offer: CanonicalMessage) -> Self {
        self.offers.push(offer);
        self
    }

    pub fn observer(mut self, observer: NegotiationObserver) -> Self {
        self.observers.push(observer);
        self
    }

    /// # Contract
    /// - `offer_id` and `dataset_id` are required.
    /// - A non-initial starting state needs a correlation id.
    pub fn build(self) -> Result<Negotiation, TckError> {
        let offer_id = required(self.offer_id, "offerId")?;
        let dataset_id = required(self.dataset_id, "datasetId")?;
        if self.state != Initialized && self.correlation_id.is_none() {
            return Err(TckError::MissingCorrelationId(self.state.to_string()));
        }
        Ok(Negotiation {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            kind: self.kind,
            offer_id,
            dataset_id,
            counter_party_id: self.counter_party_id.unwrap_or_default(),
            callback_address: self
                .callback_address
                .map(|address| address.trim_end_matches('/').to_string()),
            observers: self.observers,
            data: RwLock::new(NegotiationData {
                state: self.state,
                correlation_id: self.correlation_id,
                offers: self.offers,
                agreement: None,
            }),
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, TckError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TckError::ValidationFailure(format!("Negotiation {name} is required")))
}
